//! Inventory export for a pharmacy's back office.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::{format_timestamp, Medicine, Role};

/// One pharmacy's inventory at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryExport {
    pub pharmacy_id: String,
    pub pharmacy_name: String,
    /// Export timestamp
    pub exported_at: String,
    pub items: Vec<InventoryLine>,
    /// Sum of stock across items
    pub total_units: u64,
}

/// Single inventory row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLine {
    pub medicine_id: String,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub strength: Option<String>,
    pub dosage_form: Option<String>,
    pub batch_number: Option<String>,
    pub price: f64,
    pub stock: u32,
    pub expiry_date: NaiveDate,
    /// Days from the export date to expiry; negative once expired
    pub days_until_expiry: i64,
    pub expired: bool,
    pub marketplace_price: Option<f64>,
    pub exchange_price: Option<f64>,
    pub on_marketplace: bool,
    pub on_exchange: bool,
}

impl InventoryLine {
    fn new(medicine: &Medicine, today: NaiveDate) -> Self {
        Self {
            medicine_id: medicine.id.clone(),
            name: medicine.name.clone(),
            brand: medicine.brand.clone(),
            category: medicine.category.clone(),
            strength: medicine.strength.clone(),
            dosage_form: medicine.dosage_form.clone(),
            batch_number: medicine.batch_number.clone(),
            price: medicine.price,
            stock: medicine.stock,
            expiry_date: medicine.expiry_date,
            days_until_expiry: medicine.days_until_expiry(today),
            expired: medicine.is_expired(today),
            marketplace_price: medicine.marketplace.as_ref().and_then(|l| l.discount_price),
            exchange_price: medicine.exchange.as_ref().and_then(|l| l.discount_price),
            on_marketplace: medicine.marketplace.is_some(),
            on_exchange: medicine.exchange.is_some(),
        }
    }
}

impl InventoryExport {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV format.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("medicine_id,name,brand,category,strength,dosage_form,batch_number,price,stock,expiry_date,on_marketplace,marketplace_price,on_exchange,exchange_price,days_until_expiry,expired\n");

        for item in &self.items {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&item.medicine_id),
                escape_csv(&item.name),
                escape_csv(item.brand.as_deref().unwrap_or("")),
                escape_csv(item.category.as_deref().unwrap_or("")),
                escape_csv(item.strength.as_deref().unwrap_or("")),
                escape_csv(item.dosage_form.as_deref().unwrap_or("")),
                escape_csv(item.batch_number.as_deref().unwrap_or("")),
                item.price,
                item.stock,
                item.expiry_date,
                item.on_marketplace,
                optional_number(item.marketplace_price),
                item.on_exchange,
                optional_number(item.exchange_price),
                item.days_until_expiry,
                item.expired,
            ));
        }

        csv
    }
}

/// Builds inventory exports.
pub struct InventoryExporter<'a> {
    db: &'a Database,
}

impl<'a> InventoryExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Export a pharmacy's full inventory, ordered by name.
    pub fn export_pharmacy(&self, pharmacy_id: &str) -> CoreResult<InventoryExport> {
        self.export_pharmacy_at(pharmacy_id, Utc::now())
    }

    /// Export as of `now`; expiry columns count from its UTC date.
    pub fn export_pharmacy_at(
        &self,
        pharmacy_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<InventoryExport> {
        let pharmacy = self
            .db
            .get_account(pharmacy_id)?
            .filter(|a| a.role == Role::Pharmacy)
            .ok_or_else(|| CoreError::NotFound(format!("pharmacy {}", pharmacy_id)))?;

        let medicines = self.db.list_pharmacy_medicines(pharmacy_id)?;
        let today = now.date_naive();
        let items: Vec<InventoryLine> = medicines
            .iter()
            .map(|medicine| InventoryLine::new(medicine, today))
            .collect();
        let total_units = items.iter().map(|i| u64::from(i.stock)).sum();

        Ok(InventoryExport {
            pharmacy_id: pharmacy.id,
            pharmacy_name: pharmacy.name,
            exported_at: format_timestamp(&now),
            items,
            total_units,
        })
    }
}

fn optional_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
