//! Directory of accounts supplied by the identity service, hospital beds and
//! hospital search.

use std::cmp::Ordering;

use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::db::{AccountCriteria, Database};
use crate::error::{CoreError, CoreResult};
use crate::geo::BoundingBox;
use crate::models::{Account, BedAvailability, BedUpdate, ContactCard, HospitalMatch, Role, SearchFilter};

pub struct Directory<'a> {
    db: &'a Database,
    search: &'a SearchConfig,
}

impl<'a> Directory<'a> {
    pub fn new(db: &'a Database, search: &'a SearchConfig) -> Self {
        Self { db, search }
    }

    /// Insert or refresh a directory record.
    ///
    /// A hospital registered without bed counts keeps the ones on file.
    pub fn register_account(&self, mut account: Account) -> CoreResult<Account> {
        account.validate()?;
        if account.role == Role::Hospital && account.beds.is_none() {
            let existing = self.db.get_account(&account.id)?.and_then(|a| a.beds);
            account.beds = Some(existing.unwrap_or_default());
        }

        self.db.upsert_account(&account)?;
        info!(account_id = %account.id, role = account.role.as_str(), "account registered");
        Ok(account)
    }

    pub fn get_account(&self, account_id: &str) -> CoreResult<Account> {
        self.db
            .get_account(account_id)?
            .ok_or_else(|| CoreError::NotFound(format!("account {}", account_id)))
    }

    /// Name and phone of an account.
    pub fn contact_card(&self, account_id: &str) -> CoreResult<ContactCard> {
        self.db
            .get_contact_card(account_id)?
            .ok_or_else(|| CoreError::NotFound(format!("account {}", account_id)))
    }

    /// Apply a partial bed update. Only the hospital itself may do this.
    ///
    /// `beds_available` is recomputed as the sum of the four categories.
    pub fn update_bed_availability(
        &self,
        hospital_id: &str,
        requester_id: &str,
        update: &BedUpdate,
    ) -> CoreResult<BedAvailability> {
        if hospital_id != requester_id {
            warn!(hospital_id, requester_id, "bed update rejected: not the hospital");
            return Err(CoreError::Unauthorized(format!(
                "{} cannot update beds of {}",
                requester_id, hospital_id
            )));
        }
        if update.is_empty() {
            return Err(CoreError::Validation("bed update carries no counts".into()));
        }

        let tx = self.db.write_transaction()?;
        let hospital = self.get_account(hospital_id)?;
        if hospital.role != Role::Hospital {
            return Err(CoreError::Validation(format!(
                "{} is not a hospital",
                hospital_id
            )));
        }
        let mut beds = hospital.beds.unwrap_or_default();
        beds.apply(update);
        beds.validate()?;
        if !self.db.set_bed_availability(hospital_id, &beds)? {
            return Err(CoreError::NotFound(format!("hospital {}", hospital_id)));
        }
        tx.commit()?;

        info!(
            hospital_id,
            beds_available = beds.beds_available(),
            icu = beds.icu_available,
            nicu = beds.nicu_available,
            ventilators = beds.ventilators_available,
            general = beds.general_beds_available,
            "bed availability updated"
        );
        Ok(beds)
    }

    /// Hospitals matching the filter.
    ///
    /// With a caller position, results within the radius are ordered by
    /// distance, then id.
    pub fn search_hospitals(&self, filter: &SearchFilter) -> CoreResult<Vec<HospitalMatch>> {
        let mut criteria = AccountCriteria {
            role: Some(Role::Hospital),
            name_contains: filter.normalized_query(),
            city: filter.normalized_city(),
            area: filter.normalized_area(),
            bed_type: filter.bed_type,
            ..Default::default()
        };

        let Some(origin) = filter.near else {
            let mut hospitals = self.db.find_accounts(&criteria)?;
            hospitals.truncate(self.search.result_limit);
            debug!(count = hospitals.len(), "hospital search");
            return Ok(hospitals
                .into_iter()
                .map(|hospital| HospitalMatch {
                    hospital,
                    distance_meters: None,
                })
                .collect());
        };

        let radius = filter.radius_or(self.search.default_radius_meters)?;
        criteria.within = Some(BoundingBox::around(&origin, radius));
        let mut matches: Vec<HospitalMatch> = self
            .db
            .find_accounts(&criteria)?
            .into_iter()
            .filter_map(|hospital| {
                let distance = hospital.location?.distance_to(&origin);
                (distance <= radius).then_some(HospitalMatch {
                    hospital,
                    distance_meters: Some(distance),
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            a.distance_meters
                .partial_cmp(&b.distance_meters)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.hospital.id.cmp(&b.hospital.id))
        });
        matches.truncate(self.search.result_limit);

        debug!(radius, count = matches.len(), "hospital proximity search");
        Ok(matches)
    }
}
