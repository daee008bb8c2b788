//! Pharmacy inventory: ownership-checked medicine records, proximity search
//! and the marketplace/exchange listings.

mod listings;
mod search;

use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use crate::config::{AlertConfig, SearchConfig};
use crate::db::Database;
use crate::error::{retry_on_conflict, CoreError, CoreResult};
use crate::models::{Medicine, MedicineUpdate, Role};

/// Inventory operations over one database connection.
pub struct Inventory<'a> {
    db: &'a Database,
    search: &'a SearchConfig,
    alerts: &'a AlertConfig,
}

impl<'a> Inventory<'a> {
    pub fn new(db: &'a Database, search: &'a SearchConfig, alerts: &'a AlertConfig) -> Self {
        Self { db, search, alerts }
    }

    /// Add a medicine to a registered pharmacy's inventory.
    pub fn add_medicine(&self, medicine: Medicine) -> CoreResult<Medicine> {
        medicine.validate()?;
        let is_pharmacy = self
            .db
            .get_account(&medicine.pharmacy_id)?
            .map(|a| a.role == Role::Pharmacy)
            .unwrap_or(false);
        if !is_pharmacy {
            return Err(CoreError::NotFound(format!(
                "pharmacy {}",
                medicine.pharmacy_id
            )));
        }

        self.db.insert_medicine(&medicine)?;
        info!(
            medicine_id = %medicine.id,
            pharmacy_id = %medicine.pharmacy_id,
            name = %medicine.name,
            stock = medicine.stock,
            "medicine added"
        );
        Ok(medicine)
    }

    pub fn get_medicine(&self, medicine_id: &str) -> CoreResult<Medicine> {
        self.db
            .get_medicine(medicine_id)?
            .ok_or_else(|| CoreError::NotFound(format!("medicine {}", medicine_id)))
    }

    /// Partially update descriptive fields. Owner only.
    pub fn update_medicine(
        &self,
        medicine_id: &str,
        requester_id: &str,
        update: &MedicineUpdate,
    ) -> CoreResult<Medicine> {
        self.mutate("update_medicine", medicine_id, requester_id, |medicine| {
            update.apply_to(medicine);
            Ok(())
        })
    }

    /// Change stock by `delta`; stock never drops below zero. Owner only.
    pub fn adjust_stock(
        &self,
        medicine_id: &str,
        requester_id: &str,
        delta: i64,
    ) -> CoreResult<Medicine> {
        self.mutate("adjust_stock", medicine_id, requester_id, |medicine| {
            medicine.stock = i64::from(medicine.stock)
                .checked_add(delta)
                .and_then(|stock| u32::try_from(stock).ok())
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "stock of {} ({}) cannot change by {}",
                        medicine.name, medicine.stock, delta
                    ))
                })?;
            Ok(())
        })
    }

    /// Remove a medicine. Owner only.
    pub fn delete_medicine(&self, medicine_id: &str, requester_id: &str) -> CoreResult<()> {
        retry_on_conflict("delete_medicine", || {
            let medicine = self.owned_medicine(medicine_id, requester_id)?;
            if !self.db.delete_medicine(medicine_id, medicine.version)? {
                return Err(stale(&medicine));
            }
            info!(medicine_id, pharmacy_id = %medicine.pharmacy_id, "medicine deleted");
            Ok(())
        })
    }

    /// A pharmacy's whole inventory, by name.
    pub fn list_pharmacy_inventory(&self, pharmacy_id: &str) -> CoreResult<Vec<Medicine>> {
        Ok(self.db.list_pharmacy_medicines(pharmacy_id)?)
    }

    /// Medicines already expired or expiring within the window, soonest first.
    pub fn expiring_soon(
        &self,
        pharmacy_id: &str,
        today: NaiveDate,
        window_days: Option<u32>,
    ) -> CoreResult<Vec<Medicine>> {
        let window = window_days.unwrap_or(self.alerts.expiry_window_days);
        let until = today
            .checked_add_days(Days::new(u64::from(window)))
            .ok_or_else(|| {
                CoreError::Validation(format!("expiry window of {} days is too large", window))
            })?;
        let medicines = self.db.list_expiring_medicines(pharmacy_id, until)?;
        debug!(pharmacy_id, %until, count = medicines.len(), "expiry alert computed");
        Ok(medicines)
    }

    /// Medicines with stock below the threshold, lowest stock first.
    pub fn low_stock(&self, pharmacy_id: &str, threshold: Option<u32>) -> CoreResult<Vec<Medicine>> {
        let threshold = threshold.unwrap_or(self.alerts.low_stock_threshold);
        let medicines = self.db.list_low_stock_medicines(pharmacy_id, threshold)?;
        debug!(pharmacy_id, threshold, count = medicines.len(), "low stock alert computed");
        Ok(medicines)
    }

    /// Load, authorize, change and write back one medicine.
    ///
    /// The write is version-checked; a concurrent change is retried once
    /// against the fresh record.
    fn mutate(
        &self,
        operation: &str,
        medicine_id: &str,
        requester_id: &str,
        change: impl Fn(&mut Medicine) -> CoreResult<()>,
    ) -> CoreResult<Medicine> {
        retry_on_conflict(operation, || {
            let current = self.owned_medicine(medicine_id, requester_id)?;
            let mut updated = current.clone();
            change(&mut updated)?;
            updated.validate()?;

            if !self.db.update_medicine(&updated, current.version)? {
                return Err(stale(&current));
            }
            debug!(operation, medicine_id, version = current.version + 1, "medicine written");
            self.get_medicine(medicine_id)
        })
    }

    fn owned_medicine(&self, medicine_id: &str, requester_id: &str) -> CoreResult<Medicine> {
        let medicine = self.get_medicine(medicine_id)?;
        if medicine.pharmacy_id != requester_id {
            warn!(medicine_id, requester_id, "medicine change rejected: not the owner");
            return Err(CoreError::Unauthorized(format!(
                "{} does not own medicine {}",
                requester_id, medicine_id
            )));
        }
        Ok(medicine)
    }
}

fn stale(medicine: &Medicine) -> CoreError {
    CoreError::Conflict(format!(
        "medicine {} changed since version {}",
        medicine.id, medicine.version
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Account;

    fn setup() -> (Database, SearchConfig, AlertConfig) {
        let db = Database::open_in_memory().unwrap();
        db.upsert_account(&Account::new("ph-1".into(), Role::Pharmacy, "Apollo".into()))
            .unwrap();
        db.upsert_account(&Account::new("ph-2".into(), Role::Pharmacy, "MedPlus".into()))
            .unwrap();
        db.upsert_account(&Account::new("pat-1".into(), Role::Patient, "Arjun".into()))
            .unwrap();
        (db, SearchConfig::default(), AlertConfig::default())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn medicine(owner: &str, name: &str, stock: u32, expiry: NaiveDate) -> Medicine {
        Medicine::new(owner.into(), name.into(), 40.0, stock, expiry)
    }

    #[test]
    fn test_add_requires_pharmacy_owner() {
        let (db, search, alerts) = setup();
        let inventory = Inventory::new(&db, &search, &alerts);

        let err = inventory
            .add_medicine(medicine("pat-1", "Paracetamol", 5, date(2027, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let added = inventory
            .add_medicine(medicine("ph-1", "Paracetamol", 5, date(2027, 1, 1)))
            .unwrap();
        assert_eq!(inventory.get_medicine(&added.id).unwrap(), added);
    }

    #[test]
    fn test_add_rejects_negative_price() {
        let (db, search, alerts) = setup();
        let inventory = Inventory::new(&db, &search, &alerts);
        let mut bad = medicine("ph-1", "Paracetamol", 5, date(2027, 1, 1));
        bad.price = -1.0;
        assert!(matches!(
            inventory.add_medicine(bad),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_update_by_owner() {
        let (db, search, alerts) = setup();
        let inventory = Inventory::new(&db, &search, &alerts);
        let added = inventory
            .add_medicine(medicine("ph-1", "Paracetamol", 5, date(2027, 1, 1)))
            .unwrap();

        let updated = inventory
            .update_medicine(
                &added.id,
                "ph-1",
                &MedicineUpdate {
                    price: Some(35.5),
                    strength: Some("500mg".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.price, 35.5);
        assert_eq!(updated.strength.as_deref(), Some("500mg"));
        assert_eq!(updated.version, 1);
    }

    #[test]
    fn test_adjust_stock_never_negative() {
        let (db, search, alerts) = setup();
        let inventory = Inventory::new(&db, &search, &alerts);
        let added = inventory
            .add_medicine(medicine("ph-1", "Paracetamol", 5, date(2027, 1, 1)))
            .unwrap();

        assert_eq!(inventory.adjust_stock(&added.id, "ph-1", -3).unwrap().stock, 2);
        assert!(matches!(
            inventory.adjust_stock(&added.id, "ph-1", -3),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(inventory.get_medicine(&added.id).unwrap().stock, 2);
    }

    #[test]
    fn test_adjust_stock_extreme_deltas() {
        let (db, search, alerts) = setup();
        let inventory = Inventory::new(&db, &search, &alerts);
        let added = inventory
            .add_medicine(medicine("ph-1", "Paracetamol", 5, date(2027, 1, 1)))
            .unwrap();

        for delta in [i64::MAX, i64::MIN, i64::from(u32::MAX)] {
            assert!(matches!(
                inventory.adjust_stock(&added.id, "ph-1", delta),
                Err(CoreError::Validation(_))
            ));
        }
        let stored = inventory.get_medicine(&added.id).unwrap();
        assert_eq!(stored.stock, 5);
        assert_eq!(stored.version, added.version);

        let topped = inventory
            .adjust_stock(&added.id, "ph-1", i64::from(u32::MAX) - 5)
            .unwrap();
        assert_eq!(topped.stock, u32::MAX);
    }

    #[test]
    fn test_delete_by_owner_only() {
        let (db, search, alerts) = setup();
        let inventory = Inventory::new(&db, &search, &alerts);
        let added = inventory
            .add_medicine(medicine("ph-1", "Paracetamol", 5, date(2027, 1, 1)))
            .unwrap();

        assert!(matches!(
            inventory.delete_medicine(&added.id, "ph-2"),
            Err(CoreError::Unauthorized(_))
        ));
        inventory.delete_medicine(&added.id, "ph-1").unwrap();
        assert!(matches!(
            inventory.get_medicine(&added.id),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_alerts() {
        let (db, search, alerts) = setup();
        let inventory = Inventory::new(&db, &search, &alerts);
        let today = date(2026, 10, 1);
        let expired = inventory
            .add_medicine(medicine("ph-1", "Amoxicillin", 50, date(2026, 9, 1)))
            .unwrap();
        let soon = inventory
            .add_medicine(medicine("ph-1", "Cetirizine", 3, date(2026, 10, 20)))
            .unwrap();
        inventory
            .add_medicine(medicine("ph-1", "Ibuprofen", 80, date(2027, 6, 1)))
            .unwrap();

        let expiring = inventory.expiring_soon("ph-1", today, None).unwrap();
        let ids: Vec<_> = expiring.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![expired.id.as_str(), soon.id.as_str()]);

        let low = inventory.low_stock("ph-1", None).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, soon.id);
        assert_eq!(inventory.low_stock("ph-1", Some(60)).unwrap().len(), 2);
    }

    #[test]
    fn test_expiry_window_bounds() {
        let (db, search, alerts) = setup();
        let inventory = Inventory::new(&db, &search, &alerts);
        let today = date(2026, 3, 2);
        inventory
            .add_medicine(medicine("ph-1", "Insulin", 20, date(2090, 1, 1)))
            .unwrap();

        assert!(matches!(
            inventory.expiring_soon("ph-1", today, Some(u32::MAX)),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(
            inventory
                .expiring_soon("ph-1", today, Some(365 * 100))
                .unwrap()
                .len(),
            1
        );
    }
}
