//! Medoryx Core Library
//!
//! Coordination core of a healthcare marketplace: live patient queues,
//! appointment ledger and proximity-aware medicine search.
//!
//! # Architecture
//!
//! ```text
//!   host (HTTP layer, identity)            MedoryxCore facade
//!                │                                 │
//!                └──────────────┬──────────────────┘
//!                               │ one pooled connection per call
//!       ┌───────────────┬───────┴────────┬─────────────────┐
//!       ▼               ▼                ▼                 ▼
//!   Directory    AppointmentLedger  QueueCoordinator    Inventory
//!   (accounts,    (booking,          (tokens, serving   (search, suggest,
//!    beds)         status)            slot, per-doctor   listings, stock)
//!                      │              lock)                    │
//!                      └──── reconcile ──┘                     │
//!                               │                              │
//!                       SQLite (WAL, version-checked writes) ◄─┘
//! ```
//!
//! # Core Principle
//!
//! **Advancing a doctor's queue is all-or-nothing.** Completing the previous
//! patient and serving the next commit together or not at all.
//!
//! # Modules
//!
//! - [`db`]: SQLite storage and connection pool
//! - [`models`]: Domain types (Appointment, Medicine, Account, etc.)
//! - [`queue`]: Queue coordinator and per-doctor locks
//! - [`ledger`]: Appointment booking and status transitions
//! - [`inventory`]: Medicine search, suggestions, listings and stock
//! - [`directory`]: Accounts, hospital beds and hospital search
//! - [`export`]: Inventory export

pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod export;
pub mod ffi;
pub mod geo;
pub mod inventory;
pub mod ledger;
pub mod models;
pub mod queue;

// Re-export commonly used types
pub use config::CoreConfig;
pub use db::{Database, DatabasePool};
pub use directory::Directory;
pub use error::{CoreError, CoreResult};
pub use geo::GeoPoint;
pub use inventory::Inventory;
pub use ledger::AppointmentLedger;
pub use models::{
    Account, Appointment, AppointmentStatus, CallNextOutcome, LiveQueue, Medicine, QueueStatus,
    Role, SearchFilter,
};
pub use queue::{DoctorLocks, QueueCoordinator};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use ffi::*;

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_core(path: String) -> Result<Arc<MedoryxCore>, CoreError> {
    let mut config = CoreConfig::default();
    config.store.path = Some(path.into());
    Ok(Arc::new(MedoryxCore::with_config(config)?))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_core_in_memory() -> Result<Arc<MedoryxCore>, CoreError> {
    Ok(Arc::new(MedoryxCore::with_config(CoreConfig::default())?))
}

/// Open the core configured from `MEDORYX_*` environment variables.
#[uniffi::export]
pub fn open_core_from_env() -> Result<Arc<MedoryxCore>, CoreError> {
    let config = CoreConfig::from_env()
        .map_err(|e| CoreError::Validation(format!("invalid configuration: {:#}", e)))?;
    Ok(Arc::new(MedoryxCore::with_config(config)?))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe core for FFI.
///
/// Each call checks out its own connection, so calls for different doctors
/// or medicines do not wait on each other.
#[derive(uniffi::Object)]
pub struct MedoryxCore {
    pool: DatabasePool,
    locks: DoctorLocks,
    config: CoreConfig,
}

impl MedoryxCore {
    pub fn with_config(config: CoreConfig) -> CoreResult<Self> {
        let pool = match &config.store.path {
            Some(path) => DatabasePool::open(path, &config.store)?,
            None => DatabasePool::in_memory()?,
        };
        info!(
            path = ?config.store.path,
            max_connections = config.store.max_connections,
            "core opened"
        );
        Ok(Self {
            pool,
            locks: DoctorLocks::new(),
            config,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn queue_date(date: Option<String>) -> CoreResult<NaiveDate> {
        match date {
            Some(date) => parse_date("queue_date", &date),
            None => Ok(Utc::now().date_naive()),
        }
    }
}

#[uniffi::export]
impl MedoryxCore {
    // =========================================================================
    // Directory Operations
    // =========================================================================

    /// Add or refresh a directory record from the identity service.
    pub fn register_account(&self, account: FfiAccount) -> Result<FfiAccount, CoreError> {
        let db = self.pool.get()?;
        let account = Account::try_from(account)?;
        let stored = Directory::new(&db, &self.config.search).register_account(account)?;
        Ok(stored.into())
    }

    pub fn get_account(&self, account_id: String) -> Result<FfiAccount, CoreError> {
        let db = self.pool.get()?;
        let account = Directory::new(&db, &self.config.search).get_account(&account_id)?;
        Ok(account.into())
    }

    pub fn contact_card(&self, account_id: String) -> Result<FfiContactCard, CoreError> {
        let db = self.pool.get()?;
        let card = Directory::new(&db, &self.config.search).contact_card(&account_id)?;
        Ok(card.into())
    }

    /// Partially update a hospital's bed counts.
    pub fn update_bed_availability(
        &self,
        hospital_id: String,
        requester_id: String,
        update: FfiBedUpdate,
    ) -> Result<FfiBedAvailability, CoreError> {
        let db = self.pool.get()?;
        let beds = Directory::new(&db, &self.config.search).update_bed_availability(
            &hospital_id,
            &requester_id,
            &update.into(),
        )?;
        Ok(beds.into())
    }

    pub fn search_hospitals(
        &self,
        filter: FfiSearchFilter,
    ) -> Result<Vec<FfiHospitalMatch>, CoreError> {
        let db = self.pool.get()?;
        let filter = SearchFilter::try_from(filter)?;
        let hits = Directory::new(&db, &self.config.search).search_hospitals(&filter)?;
        Ok(hits.into_iter().map(|h| h.into()).collect())
    }

    // =========================================================================
    // Appointment Operations
    // =========================================================================

    /// Book a consultation.
    pub fn book_appointment(
        &self,
        request: FfiBookingRequest,
    ) -> Result<FfiAppointment, CoreError> {
        let db = self.pool.get()?;
        let appointment = self.ledger(&db).book(request.try_into()?)?;
        Ok(appointment.into())
    }

    pub fn get_appointment(&self, appointment_id: String) -> Result<FfiAppointment, CoreError> {
        let db = self.pool.get()?;
        Ok(self.ledger(&db).get(&appointment_id)?.into())
    }

    pub fn list_appointments_for_doctor(
        &self,
        doctor_id: String,
    ) -> Result<Vec<FfiAppointmentView>, CoreError> {
        let db = self.pool.get()?;
        let views = self.ledger(&db).list_for_doctor(&doctor_id)?;
        Ok(views.into_iter().map(|v| v.into()).collect())
    }

    pub fn list_appointments_for_patient(
        &self,
        patient_id: String,
    ) -> Result<Vec<FfiAppointmentView>, CoreError> {
        let db = self.pool.get()?;
        let views = self.ledger(&db).list_for_patient(&patient_id)?;
        Ok(views.into_iter().map(|v| v.into()).collect())
    }

    /// Move a booking to confirmed, cancelled or completed.
    pub fn update_appointment_status(
        &self,
        appointment_id: String,
        requester_id: String,
        status: String,
    ) -> Result<FfiAppointment, CoreError> {
        let status = AppointmentStatus::parse(&status)
            .ok_or_else(|| CoreError::Validation(format!("unknown status: {}", status)))?;
        let db = self.pool.get()?;
        let appointment = self
            .ledger(&db)
            .update_status(&appointment_id, &requester_id, status)?;
        Ok(appointment.into())
    }

    // =========================================================================
    // Queue Operations
    // =========================================================================

    /// Admit an appointment into its doctor's queue.
    pub fn admit(
        &self,
        appointment_id: String,
        requester_id: String,
    ) -> Result<FfiAppointment, CoreError> {
        let db = self.pool.get()?;
        let appointment = QueueCoordinator::new(&db, &self.locks).admit(&appointment_id, &requester_id)?;
        Ok(appointment.into())
    }

    /// Advance a doctor's queue. `queue_date` defaults to today (UTC).
    pub fn call_next(
        &self,
        doctor_id: String,
        requester_id: String,
        queue_date: Option<String>,
        expected_version: Option<i64>,
    ) -> Result<FfiCallNextOutcome, CoreError> {
        let date = Self::queue_date(queue_date)?;
        let db = self.pool.get()?;
        let outcome = QueueCoordinator::new(&db, &self.locks).call_next(
            &doctor_id,
            &requester_id,
            date,
            expected_version,
        )?;
        Ok(outcome.into())
    }

    pub fn skip(
        &self,
        appointment_id: String,
        requester_id: String,
    ) -> Result<FfiAppointment, CoreError> {
        let db = self.pool.get()?;
        let appointment = QueueCoordinator::new(&db, &self.locks).skip(&appointment_id, &requester_id)?;
        Ok(appointment.into())
    }

    /// Snapshot of a doctor's queue. `queue_date` defaults to today (UTC).
    pub fn live_queue(
        &self,
        doctor_id: String,
        queue_date: Option<String>,
    ) -> Result<FfiLiveQueue, CoreError> {
        let date = Self::queue_date(queue_date)?;
        let db = self.pool.get()?;
        let queue = QueueCoordinator::new(&db, &self.locks).live_queue(&doctor_id, date)?;
        Ok(queue.into())
    }

    // =========================================================================
    // Medicine Operations
    // =========================================================================

    pub fn add_medicine(&self, medicine: FfiNewMedicine) -> Result<FfiMedicine, CoreError> {
        let db = self.pool.get()?;
        let medicine = self.inventory(&db).add_medicine(medicine.try_into()?)?;
        Ok(medicine.into())
    }

    pub fn get_medicine(&self, medicine_id: String) -> Result<FfiMedicine, CoreError> {
        let db = self.pool.get()?;
        Ok(self.inventory(&db).get_medicine(&medicine_id)?.into())
    }

    pub fn update_medicine(
        &self,
        medicine_id: String,
        requester_id: String,
        update: FfiMedicineUpdate,
    ) -> Result<FfiMedicine, CoreError> {
        let update = update.try_into()?;
        let db = self.pool.get()?;
        let medicine = self
            .inventory(&db)
            .update_medicine(&medicine_id, &requester_id, &update)?;
        Ok(medicine.into())
    }

    pub fn delete_medicine(&self, medicine_id: String, requester_id: String) -> Result<(), CoreError> {
        let db = self.pool.get()?;
        self.inventory(&db).delete_medicine(&medicine_id, &requester_id)
    }

    pub fn adjust_stock(
        &self,
        medicine_id: String,
        requester_id: String,
        delta: i64,
    ) -> Result<FfiMedicine, CoreError> {
        let db = self.pool.get()?;
        let medicine = self
            .inventory(&db)
            .adjust_stock(&medicine_id, &requester_id, delta)?;
        Ok(medicine.into())
    }

    pub fn list_pharmacy_inventory(
        &self,
        pharmacy_id: String,
    ) -> Result<Vec<FfiMedicine>, CoreError> {
        let db = self.pool.get()?;
        let medicines = self.inventory(&db).list_pharmacy_inventory(&pharmacy_id)?;
        Ok(medicines.into_iter().map(|m| m.into()).collect())
    }

    /// Search in-stock medicines, nearest first when a point is given.
    pub fn search_medicines(
        &self,
        filter: FfiSearchFilter,
    ) -> Result<Vec<FfiMedicineMatch>, CoreError> {
        let filter = SearchFilter::try_from(filter)?;
        let db = self.pool.get()?;
        let hits = self.inventory(&db).search(&filter)?;
        Ok(hits.into_iter().map(|h| h.into()).collect())
    }

    pub fn suggest_medicines(&self, prefix: String) -> Result<Vec<String>, CoreError> {
        let db = self.pool.get()?;
        self.inventory(&db).suggest(&prefix)
    }

    pub fn list_marketplace(&self) -> Result<Vec<FfiMedicine>, CoreError> {
        let db = self.pool.get()?;
        let medicines = self.inventory(&db).list_marketplace()?;
        Ok(medicines.into_iter().map(|m| m.into()).collect())
    }

    pub fn list_exchange(
        &self,
        exclude_pharmacy_id: Option<String>,
    ) -> Result<Vec<FfiMedicine>, CoreError> {
        let db = self.pool.get()?;
        let medicines = self
            .inventory(&db)
            .list_exchange(exclude_pharmacy_id.as_deref())?;
        Ok(medicines.into_iter().map(|m| m.into()).collect())
    }

    pub fn toggle_marketplace(
        &self,
        medicine_id: String,
        requester_id: String,
        listed: bool,
        discount_price: Option<f64>,
    ) -> Result<FfiMedicine, CoreError> {
        let db = self.pool.get()?;
        let medicine = self.inventory(&db).toggle_marketplace(
            &medicine_id,
            &requester_id,
            listed,
            discount_price,
        )?;
        Ok(medicine.into())
    }

    pub fn toggle_exchange(
        &self,
        medicine_id: String,
        requester_id: String,
        listed: bool,
        discount_price: Option<f64>,
    ) -> Result<FfiMedicine, CoreError> {
        let db = self.pool.get()?;
        let medicine = self.inventory(&db).toggle_exchange(
            &medicine_id,
            &requester_id,
            listed,
            discount_price,
        )?;
        Ok(medicine.into())
    }

    /// Medicines expired or expiring within the window, from today (UTC).
    pub fn expiring_soon(
        &self,
        pharmacy_id: String,
        window_days: Option<u32>,
    ) -> Result<Vec<FfiMedicine>, CoreError> {
        let db = self.pool.get()?;
        let medicines = self.inventory(&db).expiring_soon(
            &pharmacy_id,
            Utc::now().date_naive(),
            window_days,
        )?;
        Ok(medicines.into_iter().map(|m| m.into()).collect())
    }

    pub fn low_stock(
        &self,
        pharmacy_id: String,
        threshold: Option<u32>,
    ) -> Result<Vec<FfiMedicine>, CoreError> {
        let db = self.pool.get()?;
        let medicines = self.inventory(&db).low_stock(&pharmacy_id, threshold)?;
        Ok(medicines.into_iter().map(|m| m.into()).collect())
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    /// Export a pharmacy's inventory as JSON.
    pub fn export_inventory_json(&self, pharmacy_id: String) -> Result<String, CoreError> {
        let db = self.pool.get()?;
        let export = export::InventoryExporter::new(&db).export_pharmacy(&pharmacy_id)?;
        Ok(export.to_json()?)
    }

    /// Export a pharmacy's inventory as CSV.
    pub fn export_inventory_csv(&self, pharmacy_id: String) -> Result<String, CoreError> {
        let db = self.pool.get()?;
        let export = export::InventoryExporter::new(&db).export_pharmacy(&pharmacy_id)?;
        Ok(export.to_csv())
    }
}

impl MedoryxCore {
    fn ledger<'a>(&'a self, db: &'a Database) -> AppointmentLedger<'a> {
        AppointmentLedger::new(db, &self.locks, &self.config.queue)
    }

    fn inventory<'a>(&'a self, db: &'a Database) -> Inventory<'a> {
        Inventory::new(db, &self.config.search, &self.config.alerts)
    }
}
