//! Marketplace and exchange listings.

use tracing::{debug, info};

use super::Inventory;
use crate::error::{CoreError, CoreResult};
use crate::models::{Listing, ListingKind, Medicine};

impl<'a> Inventory<'a> {
    /// Medicines offered on the marketplace, soonest expiry first.
    pub fn list_marketplace(&self) -> CoreResult<Vec<Medicine>> {
        let medicines = self.db.list_listed_medicines(ListingKind::Marketplace, None)?;
        debug!(count = medicines.len(), "marketplace listed");
        Ok(medicines)
    }

    /// Medicines offered for exchange by other pharmacies, soonest expiry first.
    pub fn list_exchange(&self, exclude_pharmacy_id: Option<&str>) -> CoreResult<Vec<Medicine>> {
        let medicines = self
            .db
            .list_listed_medicines(ListingKind::Exchange, exclude_pharmacy_id)?;
        debug!(
            excluded = exclude_pharmacy_id,
            count = medicines.len(),
            "exchange listed"
        );
        Ok(medicines)
    }

    pub fn toggle_marketplace(
        &self,
        medicine_id: &str,
        requester_id: &str,
        listed: bool,
        discount_price: Option<f64>,
    ) -> CoreResult<Medicine> {
        self.toggle(ListingKind::Marketplace, medicine_id, requester_id, listed, discount_price)
    }

    pub fn toggle_exchange(
        &self,
        medicine_id: &str,
        requester_id: &str,
        listed: bool,
        discount_price: Option<f64>,
    ) -> CoreResult<Medicine> {
        self.toggle(ListingKind::Exchange, medicine_id, requester_id, listed, discount_price)
    }

    /// Set or clear a listing flag. Clearing drops the discount price.
    fn toggle(
        &self,
        kind: ListingKind,
        medicine_id: &str,
        requester_id: &str,
        listed: bool,
        discount_price: Option<f64>,
    ) -> CoreResult<Medicine> {
        let operation = match kind {
            ListingKind::Marketplace => "toggle_marketplace",
            ListingKind::Exchange => "toggle_exchange",
        };
        let medicine = self.mutate(operation, medicine_id, requester_id, |medicine| {
            if !listed && discount_price.is_some() {
                return Err(CoreError::Validation(format!(
                    "a {} discount price needs the listing turned on",
                    kind.label()
                )));
            }
            let listing = listed.then_some(Listing { discount_price });
            match kind {
                ListingKind::Marketplace => medicine.marketplace = listing,
                ListingKind::Exchange => medicine.exchange = listing,
            }
            Ok(())
        })?;

        info!(
            medicine_id,
            listing = kind.label(),
            listed,
            discount_price,
            "listing toggled"
        );
        Ok(medicine)
    }
}
