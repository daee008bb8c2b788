//! Domain models for the Medoryx core.

mod account;
mod appointment;
mod medicine;
mod queue;
mod search;

pub use account::*;
pub use appointment::*;
pub use medicine::*;
pub use queue::*;
pub use search::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Storage format for timestamps: RFC 3339, UTC, second precision.
///
/// Lexical order of these strings equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time in storage format.
pub fn timestamp_now() -> String {
    format_timestamp(&Utc::now())
}
