//! Export of pharmacy inventory.

mod inventory;

pub use inventory::*;
