//! Medicine inventory database operations.

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::accounts::{like_contains, like_prefix};
use super::{Database, DbError, DbResult};
use crate::models::{timestamp_now, Listing, ListingKind, Medicine};

const MEDICINE_COLUMNS: &str = r#"
    m.id, m.pharmacy_id, m.name, m.brand, m.category, m.price, m.stock,
    m.expiry_date, m.batch_number, m.dosage_form, m.strength,
    m.is_on_marketplace, m.marketplace_price, m.on_exchange, m.exchange_price,
    m.version, m.created_at, m.updated_at
"#;

/// Filter for inventory searches.
#[derive(Debug, Clone, Default)]
pub struct MedicineCriteria<'q> {
    /// Case-insensitive substring of the name
    pub name_contains: Option<&'q str>,
    /// Restrict to these owners; an empty slice matches nothing
    pub pharmacy_ids: Option<&'q [String]>,
    pub in_stock_only: bool,
    pub limit: Option<usize>,
}

impl Database {
    /// Insert a new medicine.
    pub fn insert_medicine(&self, medicine: &Medicine) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO medicines (
                id, pharmacy_id, name, brand, category, price, stock, expiry_date,
                batch_number, dosage_form, strength, is_on_marketplace, marketplace_price,
                on_exchange, exchange_price, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                medicine.id,
                medicine.pharmacy_id,
                medicine.name,
                medicine.brand,
                medicine.category,
                medicine.price,
                medicine.stock,
                medicine.expiry_date.to_string(),
                medicine.batch_number,
                medicine.dosage_form,
                medicine.strength,
                medicine.marketplace.is_some(),
                medicine.marketplace.as_ref().and_then(|l| l.discount_price),
                medicine.exchange.is_some(),
                medicine.exchange.as_ref().and_then(|l| l.discount_price),
                medicine.version,
                medicine.created_at,
                medicine.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a medicine by ID.
    pub fn get_medicine(&self, id: &str) -> DbResult<Option<Medicine>> {
        let sql = format!("SELECT {} FROM medicines m WHERE m.id = ?", MEDICINE_COLUMNS);
        self.conn
            .query_row(&sql, [id], read_medicine_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Write all mutable fields if the stored version still matches.
    ///
    /// Returns `false` when the row is gone or was changed concurrently.
    pub fn update_medicine(&self, medicine: &Medicine, expected_version: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE medicines SET
                name = ?3,
                brand = ?4,
                category = ?5,
                price = ?6,
                stock = ?7,
                expiry_date = ?8,
                batch_number = ?9,
                dosage_form = ?10,
                strength = ?11,
                is_on_marketplace = ?12,
                marketplace_price = ?13,
                on_exchange = ?14,
                exchange_price = ?15,
                version = version + 1,
                updated_at = ?16
            WHERE id = ?1 AND version = ?2
            "#,
            params![
                medicine.id,
                expected_version,
                medicine.name,
                medicine.brand,
                medicine.category,
                medicine.price,
                medicine.stock,
                medicine.expiry_date.to_string(),
                medicine.batch_number,
                medicine.dosage_form,
                medicine.strength,
                medicine.marketplace.is_some(),
                medicine.marketplace.as_ref().and_then(|l| l.discount_price),
                medicine.exchange.is_some(),
                medicine.exchange.as_ref().and_then(|l| l.discount_price),
                timestamp_now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete a medicine if the stored version still matches.
    pub fn delete_medicine(&self, id: &str, expected_version: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM medicines WHERE id = ?1 AND version = ?2",
            params![id, expected_version],
        )?;
        Ok(rows_affected > 0)
    }

    /// Search medicines joined with their pharmacy name, in insertion order.
    pub fn search_medicines(
        &self,
        criteria: &MedicineCriteria<'_>,
    ) -> DbResult<Vec<(Medicine, String)>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(ids) = criteria.pharmacy_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            clauses.push(format!("m.pharmacy_id IN ({})", placeholders));
            values.extend(ids.iter().cloned().map(Into::into));
        }
        if let Some(name) = criteria.name_contains {
            clauses.push("m.name LIKE ? ESCAPE '\\'".into());
            values.push(like_contains(name).into());
        }
        if criteria.in_stock_only {
            clauses.push("m.stock > 0".into());
        }

        let mut sql = format!(
            "SELECT {}, a.name FROM medicines m JOIN accounts a ON a.id = m.pharmacy_id",
            MEDICINE_COLUMNS
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY m.rowid");
        if let Some(limit) = criteria.limit {
            sql.push_str(" LIMIT ?");
            values.push((limit as i64).into());
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok((read_medicine_row(row)?, row.get::<_, String>(18)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (medicine_row, pharmacy_name) = row?;
            results.push((medicine_row.try_into()?, pharmacy_name));
        }
        Ok(results)
    }

    /// Distinct medicine names starting with `prefix` (case-insensitive).
    pub fn suggest_medicine_names(&self, prefix: &str, limit: usize) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name FROM medicines
            WHERE name LIKE ? ESCAPE '\'
            GROUP BY name COLLATE NOCASE
            ORDER BY name COLLATE NOCASE
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(params![like_prefix(prefix), limit as i64], |row| {
            row.get::<_, String>(0)
        })?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    /// Medicines carrying a listing flag, soonest expiry first.
    pub fn list_listed_medicines(
        &self,
        kind: ListingKind,
        exclude_pharmacy: Option<&str>,
    ) -> DbResult<Vec<Medicine>> {
        let flag = match kind {
            ListingKind::Marketplace => "m.is_on_marketplace",
            ListingKind::Exchange => "m.on_exchange",
        };
        let sql = format!(
            r#"
            SELECT {} FROM medicines m
            WHERE {} = 1 AND (?1 IS NULL OR m.pharmacy_id <> ?1)
            ORDER BY m.expiry_date ASC, m.id ASC
            "#,
            MEDICINE_COLUMNS, flag
        );
        self.collect_medicines(&sql, params![exclude_pharmacy])
    }

    /// All medicines owned by a pharmacy, by name.
    pub fn list_pharmacy_medicines(&self, pharmacy_id: &str) -> DbResult<Vec<Medicine>> {
        let sql = format!(
            "SELECT {} FROM medicines m WHERE m.pharmacy_id = ? ORDER BY m.name COLLATE NOCASE, m.id",
            MEDICINE_COLUMNS
        );
        self.collect_medicines(&sql, params![pharmacy_id])
    }

    /// A pharmacy's medicines expiring on or before `until`, soonest first.
    pub fn list_expiring_medicines(
        &self,
        pharmacy_id: &str,
        until: NaiveDate,
    ) -> DbResult<Vec<Medicine>> {
        let sql = format!(
            r#"
            SELECT {} FROM medicines m
            WHERE m.pharmacy_id = ?1 AND m.expiry_date <= ?2
            ORDER BY m.expiry_date ASC, m.id ASC
            "#,
            MEDICINE_COLUMNS
        );
        self.collect_medicines(&sql, params![pharmacy_id, until.to_string()])
    }

    /// A pharmacy's medicines with stock below `threshold`, lowest first.
    pub fn list_low_stock_medicines(
        &self,
        pharmacy_id: &str,
        threshold: u32,
    ) -> DbResult<Vec<Medicine>> {
        let sql = format!(
            r#"
            SELECT {} FROM medicines m
            WHERE m.pharmacy_id = ?1 AND m.stock < ?2
            ORDER BY m.stock ASC, m.name COLLATE NOCASE, m.id
            "#,
            MEDICINE_COLUMNS
        );
        self.collect_medicines(&sql, params![pharmacy_id, threshold])
    }

    fn collect_medicines(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> DbResult<Vec<Medicine>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, read_medicine_row)?;

        let mut medicines = Vec::new();
        for row in rows {
            medicines.push(row?.try_into()?);
        }
        Ok(medicines)
    }
}

fn read_medicine_row(row: &Row<'_>) -> rusqlite::Result<MedicineRow> {
    Ok(MedicineRow {
        id: row.get(0)?,
        pharmacy_id: row.get(1)?,
        name: row.get(2)?,
        brand: row.get(3)?,
        category: row.get(4)?,
        price: row.get(5)?,
        stock: row.get(6)?,
        expiry_date: row.get(7)?,
        batch_number: row.get(8)?,
        dosage_form: row.get(9)?,
        strength: row.get(10)?,
        is_on_marketplace: row.get(11)?,
        marketplace_price: row.get(12)?,
        on_exchange: row.get(13)?,
        exchange_price: row.get(14)?,
        version: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

/// Intermediate row struct for database mapping.
struct MedicineRow {
    id: String,
    pharmacy_id: String,
    name: String,
    brand: Option<String>,
    category: Option<String>,
    price: f64,
    stock: u32,
    expiry_date: String,
    batch_number: Option<String>,
    dosage_form: Option<String>,
    strength: Option<String>,
    is_on_marketplace: bool,
    marketplace_price: Option<f64>,
    on_exchange: bool,
    exchange_price: Option<f64>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<MedicineRow> for Medicine {
    type Error = DbError;

    fn try_from(row: MedicineRow) -> Result<Self, Self::Error> {
        let expiry_date = row.expiry_date.parse::<NaiveDate>().map_err(|e| {
            DbError::Constraint(format!("Invalid expiry date {}: {}", row.expiry_date, e))
        })?;

        Ok(Medicine {
            id: row.id,
            pharmacy_id: row.pharmacy_id,
            name: row.name,
            brand: row.brand,
            category: row.category,
            price: row.price,
            stock: row.stock,
            expiry_date,
            batch_number: row.batch_number,
            dosage_form: row.dosage_form,
            strength: row.strength,
            marketplace: row.is_on_marketplace.then(|| Listing {
                discount_price: row.marketplace_price,
            }),
            exchange: row.on_exchange.then(|| Listing {
                discount_price: row.exchange_price,
            }),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
