//! Directory database operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::geo::{BoundingBox, GeoPoint};
use crate::models::{timestamp_now, Account, BedAvailability, BedType, ContactCard, Role};

const ACCOUNT_COLUMNS: &str = r#"
    id, role, name, phone, city, area, longitude, latitude,
    total_beds, icu_available, nicu_available, ventilators_available,
    general_beds_available
"#;

/// Directory filter used by proximity and hospital lookups.
#[derive(Debug, Clone, Default)]
pub struct AccountCriteria<'q> {
    pub role: Option<Role>,
    /// Case-insensitive substring of the name
    pub name_contains: Option<&'q str>,
    pub city: Option<&'q str>,
    pub area: Option<&'q str>,
    /// Only accounts with a stored point inside this box
    pub within: Option<BoundingBox>,
    /// Hospitals with at least one free bed of this type
    pub bed_type: Option<BedType>,
}

impl Database {
    /// Insert or update a directory record.
    pub fn upsert_account(&self, account: &Account) -> DbResult<()> {
        let beds = account.beds.as_ref();
        self.conn.execute(
            r#"
            INSERT INTO accounts (
                id, role, name, phone, city, area, longitude, latitude,
                total_beds, icu_available, nicu_available, ventilators_available,
                general_beds_available, beds_available, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                role = excluded.role,
                name = excluded.name,
                phone = excluded.phone,
                city = excluded.city,
                area = excluded.area,
                longitude = excluded.longitude,
                latitude = excluded.latitude,
                total_beds = excluded.total_beds,
                icu_available = excluded.icu_available,
                nicu_available = excluded.nicu_available,
                ventilators_available = excluded.ventilators_available,
                general_beds_available = excluded.general_beds_available,
                beds_available = excluded.beds_available,
                updated_at = excluded.updated_at
            "#,
            params![
                account.id,
                account.role.as_str(),
                account.name,
                account.phone,
                account.city,
                account.area,
                account.location.map(|p| p.longitude),
                account.location.map(|p| p.latitude),
                beds.map(|b| b.total_beds),
                beds.map(|b| b.icu_available),
                beds.map(|b| b.nicu_available),
                beds.map(|b| b.ventilators_available),
                beds.map(|b| b.general_beds_available),
                beds.map(|b| b.beds_available()),
                timestamp_now(),
            ],
        )?;
        Ok(())
    }

    /// Get a directory record by ID.
    pub fn get_account(&self, id: &str) -> DbResult<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS);
        self.conn
            .query_row(&sql, [id], read_account_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Name and phone for an account.
    pub fn get_contact_card(&self, id: &str) -> DbResult<Option<ContactCard>> {
        self.conn
            .query_row(
                "SELECT id, name, phone FROM accounts WHERE id = ?",
                [id],
                |row| {
                    Ok(ContactCard {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Find accounts matching the criteria, in insertion order.
    pub fn find_accounts(&self, criteria: &AccountCriteria<'_>) -> DbResult<Vec<Account>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(role) = criteria.role {
            clauses.push("role = ?".into());
            values.push(role.as_str().to_string().into());
        }
        if let Some(name) = criteria.name_contains {
            clauses.push("name LIKE ? ESCAPE '\\'".into());
            values.push(like_contains(name).into());
        }
        if let Some(city) = criteria.city {
            clauses.push("city = ? COLLATE NOCASE".into());
            values.push(city.to_string().into());
        }
        if let Some(area) = criteria.area {
            clauses.push("area = ? COLLATE NOCASE".into());
            values.push(area.to_string().into());
        }
        if let Some(bbox) = criteria.within {
            clauses.push(
                "latitude IS NOT NULL AND latitude BETWEEN ? AND ? AND longitude BETWEEN ? AND ?"
                    .into(),
            );
            values.push(bbox.min_latitude.into());
            values.push(bbox.max_latitude.into());
            values.push(bbox.min_longitude.into());
            values.push(bbox.max_longitude.into());
        }
        if let Some(bed_type) = criteria.bed_type {
            clauses.push(format!("{} > 0", bed_type.column()));
        }

        let mut sql = format!("SELECT {} FROM accounts", ACCOUNT_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY rowid");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), read_account_row)?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?.try_into()?);
        }
        Ok(accounts)
    }

    /// Overwrite a hospital's bed counts and recompute `beds_available`.
    pub fn set_bed_availability(&self, hospital_id: &str, beds: &BedAvailability) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE accounts SET
                total_beds = ?2,
                icu_available = ?3,
                nicu_available = ?4,
                ventilators_available = ?5,
                general_beds_available = ?6,
                beds_available = ?7,
                updated_at = ?8
            WHERE id = ?1 AND role = 'hospital'
            "#,
            params![
                hospital_id,
                beds.total_beds,
                beds.icu_available,
                beds.nicu_available,
                beds.ventilators_available,
                beds.general_beds_available,
                beds.beds_available(),
                timestamp_now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Stored `beds_available` column for a hospital.
    pub fn get_beds_available(&self, hospital_id: &str) -> DbResult<Option<u32>> {
        self.conn
            .query_row(
                "SELECT beds_available FROM accounts WHERE id = ?",
                [hospital_id],
                |row| row.get::<_, Option<u32>>(0),
            )
            .optional()
            .map(Option::flatten)
            .map_err(Into::into)
    }
}

/// `%needle%` pattern with LIKE wildcards escaped.
pub(crate) fn like_contains(needle: &str) -> String {
    format!("%{}%", escape_like(needle))
}

/// `needle%` pattern with LIKE wildcards escaped.
pub(crate) fn like_prefix(needle: &str) -> String {
    format!("{}%", escape_like(needle))
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn read_account_row(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        role: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        city: row.get(4)?,
        area: row.get(5)?,
        longitude: row.get(6)?,
        latitude: row.get(7)?,
        total_beds: row.get(8)?,
        icu_available: row.get(9)?,
        nicu_available: row.get(10)?,
        ventilators_available: row.get(11)?,
        general_beds_available: row.get(12)?,
    })
}

/// Intermediate row struct for database mapping.
struct AccountRow {
    id: String,
    role: String,
    name: String,
    phone: Option<String>,
    city: Option<String>,
    area: Option<String>,
    longitude: Option<f64>,
    latitude: Option<f64>,
    total_beds: Option<u32>,
    icu_available: Option<u32>,
    nicu_available: Option<u32>,
    ventilators_available: Option<u32>,
    general_beds_available: Option<u32>,
}

impl TryFrom<AccountRow> for Account {
    type Error = DbError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| DbError::Constraint(format!("Unknown account role: {}", row.role)))?;

        let location = match (row.longitude, row.latitude) {
            (Some(longitude), Some(latitude)) => Some(GeoPoint {
                longitude,
                latitude,
            }),
            _ => None,
        };

        let beds = if role == Role::Hospital {
            Some(BedAvailability {
                total_beds: row.total_beds.unwrap_or(0),
                icu_available: row.icu_available.unwrap_or(0),
                nicu_available: row.nicu_available.unwrap_or(0),
                ventilators_available: row.ventilators_available.unwrap_or(0),
                general_beds_available: row.general_beds_available.unwrap_or(0),
            })
        } else {
            None
        };

        Ok(Account {
            id: row.id,
            role,
            name: row.name,
            phone: row.phone,
            city: row.city,
            area: row.area,
            location,
            beds,
        })
    }
}
