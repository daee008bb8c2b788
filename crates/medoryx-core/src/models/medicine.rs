//! Pharmacy inventory models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A medicine held in stock by one pharmacy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medicine {
    /// Unique medicine ID
    pub id: String,
    /// Owning pharmacy account ID
    pub pharmacy_id: String,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    /// List price
    pub price: f64,
    /// Units in stock
    pub stock: u32,
    pub expiry_date: NaiveDate,
    pub batch_number: Option<String>,
    /// Tablet, syrup, injection, ...
    pub dosage_form: Option<String>,
    /// e.g. "500mg"
    pub strength: Option<String>,
    /// Present when listed on the public marketplace
    pub marketplace: Option<Listing>,
    /// Present when offered to other pharmacies
    pub exchange: Option<Listing>,
    /// Optimistic concurrency version
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Listing details attached to a marketplace or exchange flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub discount_price: Option<f64>,
}

/// Which listing flag an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Marketplace,
    Exchange,
}

impl ListingKind {
    pub fn label(&self) -> &'static str {
        match self {
            ListingKind::Marketplace => "marketplace",
            ListingKind::Exchange => "exchange",
        }
    }
}

impl Medicine {
    /// Create a new medicine with required fields.
    pub fn new(
        pharmacy_id: String,
        name: String,
        price: f64,
        stock: u32,
        expiry_date: NaiveDate,
    ) -> Self {
        let now = crate::models::timestamp_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pharmacy_id,
            name,
            brand: None,
            category: None,
            price,
            stock,
            expiry_date,
            batch_number: None,
            dosage_form: None,
            strength: None,
            marketplace: None,
            exchange: None,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    /// Days until expiry; negative once expired.
    pub fn days_until_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }

    pub fn listing(&self, kind: ListingKind) -> Option<&Listing> {
        match kind {
            ListingKind::Marketplace => self.marketplace.as_ref(),
            ListingKind::Exchange => self.exchange.as_ref(),
        }
    }

    /// Validate field values before a write.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("medicine name is required".into()));
        }
        if self.pharmacy_id.trim().is_empty() {
            return Err(CoreError::Validation("owning pharmacy is required".into()));
        }
        validate_price("price", self.price)?;
        for kind in [ListingKind::Marketplace, ListingKind::Exchange] {
            if let Some(discount) = self.listing(kind).and_then(|l| l.discount_price) {
                validate_discount(kind, discount, self.price)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_price(field: &str, price: f64) -> CoreResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(CoreError::Validation(format!(
            "{} must be a non-negative number",
            field
        )));
    }
    Ok(())
}

pub(crate) fn validate_discount(kind: ListingKind, discount: f64, price: f64) -> CoreResult<()> {
    validate_price(&format!("{} discount price", kind.label()), discount)?;
    if discount > price {
        return Err(CoreError::Validation(format!(
            "{} discount price {} exceeds list price {}",
            kind.label(),
            discount,
            price
        )));
    }
    Ok(())
}

/// Partial update of a medicine's descriptive fields.
///
/// Listing flags are changed through the toggle operations only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MedicineUpdate {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<u32>,
    pub expiry_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    pub dosage_form: Option<String>,
    pub strength: Option<String>,
}

impl MedicineUpdate {
    /// Apply to a medicine in place.
    pub fn apply_to(&self, medicine: &mut Medicine) {
        if let Some(v) = &self.name {
            medicine.name = v.clone();
        }
        if let Some(v) = &self.brand {
            medicine.brand = Some(v.clone());
        }
        if let Some(v) = &self.category {
            medicine.category = Some(v.clone());
        }
        if let Some(v) = self.price {
            medicine.price = v;
        }
        if let Some(v) = self.stock {
            medicine.stock = v;
        }
        if let Some(v) = self.expiry_date {
            medicine.expiry_date = v;
        }
        if let Some(v) = &self.batch_number {
            medicine.batch_number = Some(v.clone());
        }
        if let Some(v) = &self.dosage_form {
            medicine.dosage_form = Some(v.clone());
        }
        if let Some(v) = &self.strength {
            medicine.strength = Some(v.clone());
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicineMatch {
    pub medicine: Medicine,
    pub pharmacy_name: String,
    /// Meters from the caller; only set for coordinate searches
    pub distance_meters: Option<f64>,
}
