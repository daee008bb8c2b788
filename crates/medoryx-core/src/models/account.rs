//! Directory records: patients, doctors, pharmacies and hospitals.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::geo::GeoPoint;

/// Account role as resolved by the identity service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Pharmacy,
    Hospital,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Pharmacy => "pharmacy",
            Role::Hospital => "hospital",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "patient" => Some(Role::Patient),
            "doctor" => Some(Role::Doctor),
            "pharmacy" => Some(Role::Pharmacy),
            "hospital" => Some(Role::Hospital),
            _ => None,
        }
    }
}

/// A directory record supplied by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    /// Identity-service user ID
    pub id: String,
    pub role: Role,
    /// Display name (person, pharmacy or hospital)
    pub name: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    /// Stored point for pharmacies and hospitals
    pub location: Option<GeoPoint>,
    /// Bed counts, hospitals only
    pub beds: Option<BedAvailability>,
}

impl Account {
    /// Create an account with required fields.
    pub fn new(id: String, role: Role, name: String) -> Self {
        Self {
            id,
            role,
            name,
            phone: None,
            city: None,
            area: None,
            location: None,
            beds: if role == Role::Hospital {
                Some(BedAvailability::default())
            } else {
                None
            },
        }
    }

    /// Minimal profile shown to the other party of an appointment.
    pub fn contact_card(&self) -> ContactCard {
        ContactCard {
            id: self.id.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
        }
    }

    /// Validate before writing to the directory.
    pub fn validate(&self) -> CoreResult<()> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation("account id is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("account name is required".into()));
        }
        if let Some(point) = &self.location {
            GeoPoint::new(point.longitude, point.latitude)?;
        }
        if let Some(beds) = &self.beds {
            if self.role != Role::Hospital {
                return Err(CoreError::Validation(
                    "only hospitals carry bed availability".into(),
                ));
            }
            beds.validate()?;
        }
        Ok(())
    }
}

/// Name and phone of an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactCard {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Bed category used to filter hospitals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BedType {
    Icu,
    Nicu,
    Ventilator,
    General,
}

impl BedType {
    pub fn parse(s: &str) -> Option<BedType> {
        match s.trim().to_lowercase().as_str() {
            "icu" => Some(BedType::Icu),
            "nicu" => Some(BedType::Nicu),
            "ventilator" | "ventilators" => Some(BedType::Ventilator),
            "general" => Some(BedType::General),
            _ => None,
        }
    }

    /// Column holding the available count for this category.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            BedType::Icu => "icu_available",
            BedType::Nicu => "nicu_available",
            BedType::Ventilator => "ventilators_available",
            BedType::General => "general_beds_available",
        }
    }
}

/// Hospital bed counts.
///
/// `beds_available` is derived; it always equals the sum of the four
/// category counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BedAvailability {
    pub total_beds: u32,
    pub icu_available: u32,
    pub nicu_available: u32,
    pub ventilators_available: u32,
    pub general_beds_available: u32,
}

impl BedAvailability {
    /// Sum of the four categories, saturating at `u32::MAX`.
    ///
    /// Counts that passed [`BedAvailability::validate`] never saturate.
    pub fn beds_available(&self) -> u32 {
        self.checked_beds_available().unwrap_or(u32::MAX)
    }

    fn checked_beds_available(&self) -> Option<u32> {
        self.icu_available
            .checked_add(self.nicu_available)?
            .checked_add(self.ventilators_available)?
            .checked_add(self.general_beds_available)
    }

    /// The category sum must fit the `beds_available` count.
    pub fn validate(&self) -> CoreResult<()> {
        if self.checked_beds_available().is_none() {
            return Err(CoreError::Validation(format!(
                "bed counts too large: icu {}, nicu {}, ventilators {}, general {}",
                self.icu_available,
                self.nicu_available,
                self.ventilators_available,
                self.general_beds_available
            )));
        }
        Ok(())
    }

    pub fn available(&self, bed_type: BedType) -> u32 {
        match bed_type {
            BedType::Icu => self.icu_available,
            BedType::Nicu => self.nicu_available,
            BedType::Ventilator => self.ventilators_available,
            BedType::General => self.general_beds_available,
        }
    }

    /// Apply a partial update; untouched categories keep their counts.
    pub fn apply(&mut self, update: &BedUpdate) {
        if let Some(v) = update.total_beds {
            self.total_beds = v;
        }
        if let Some(v) = update.icu_available {
            self.icu_available = v;
        }
        if let Some(v) = update.nicu_available {
            self.nicu_available = v;
        }
        if let Some(v) = update.ventilators_available {
            self.ventilators_available = v;
        }
        if let Some(v) = update.general_beds_available {
            self.general_beds_available = v;
        }
    }
}

/// Partial bed availability update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BedUpdate {
    pub total_beds: Option<u32>,
    pub icu_available: Option<u32>,
    pub nicu_available: Option<u32>,
    pub ventilators_available: Option<u32>,
    pub general_beds_available: Option<u32>,
}

impl BedUpdate {
    pub fn is_empty(&self) -> bool {
        self.total_beds.is_none()
            && self.icu_available.is_none()
            && self.nicu_available.is_none()
            && self.ventilators_available.is_none()
            && self.general_beds_available.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Patient, Role::Doctor, Role::Pharmacy, Role::Hospital] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("Doctor"), Some(Role::Doctor));
        assert_eq!(Role::parse("admin"), None);
    }

    #[test]
    fn test_beds_available_is_category_sum() {
        let mut beds = BedAvailability::default();
        beds.apply(&BedUpdate {
            icu_available: Some(2),
            nicu_available: Some(1),
            ventilators_available: Some(0),
            general_beds_available: Some(5),
            ..Default::default()
        });
        assert_eq!(beds.beds_available(), 8);

        beds.apply(&BedUpdate {
            icu_available: Some(4),
            ..Default::default()
        });
        assert_eq!(beds.beds_available(), 10);
        assert_eq!(beds.general_beds_available, 5);
    }

    #[test]
    fn test_bed_counts_must_fit_the_sum() {
        let mut hospital = Account::new("h1".into(), Role::Hospital, "City Hospital".into());
        hospital.beds = Some(BedAvailability {
            icu_available: u32::MAX,
            general_beds_available: 1,
            ..Default::default()
        });
        assert!(matches!(hospital.validate(), Err(CoreError::Validation(_))));

        let beds = hospital.beds.unwrap();
        assert_eq!(beds.beds_available(), u32::MAX);

        let fits = BedAvailability {
            icu_available: u32::MAX - 1,
            general_beds_available: 1,
            ..Default::default()
        };
        assert!(fits.validate().is_ok());
        assert_eq!(fits.beds_available(), u32::MAX);
    }

    #[test]
    fn test_only_hospitals_have_beds() {
        let hospital = Account::new("h1".into(), Role::Hospital, "City Hospital".into());
        assert!(hospital.beds.is_some());

        let mut pharmacy = Account::new("p1".into(), Role::Pharmacy, "Corner Pharmacy".into());
        assert!(pharmacy.beds.is_none());
        pharmacy.beds = Some(BedAvailability::default());
        assert!(matches!(pharmacy.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_bed_type_parse() {
        assert_eq!(BedType::parse("ICU"), Some(BedType::Icu));
        assert_eq!(BedType::parse("ventilators"), Some(BedType::Ventilator));
        assert_eq!(BedType::parse("oxygen"), None);
    }
}
