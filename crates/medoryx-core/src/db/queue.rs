//! Doctor queue database operations.
//!
//! One `doctor_queues` row per doctor per day holds the token counter and the
//! serving slot. Every write to it is checked against the row version.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::appointments::{read_appointment_row, APPOINTMENT_COLUMNS};
use super::{Database, DbResult};
use crate::models::{timestamp_now, Appointment, QueueStatus};

/// Counter and serving slot of one doctor's queue for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueState {
    pub next_token: u32,
    pub serving_appointment_id: Option<String>,
    pub version: i64,
}

impl Database {
    /// Create the queue row for a doctor's day if it does not exist yet.
    pub fn ensure_queue_row(&self, doctor_id: &str, date: NaiveDate) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO doctor_queues (doctor_id, queue_date, updated_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![doctor_id, date.to_string(), timestamp_now()],
        )?;
        Ok(())
    }

    pub fn get_queue_state(
        &self,
        doctor_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<QueueState>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT next_token, serving_appointment_id, version
                FROM doctor_queues WHERE doctor_id = ?1 AND queue_date = ?2
                "#,
                params![doctor_id, date.to_string()],
                |row| {
                    Ok(QueueState {
                        next_token: row.get(0)?,
                        serving_appointment_id: row.get(1)?,
                        version: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    /// Consume the next token. Returns false if the version moved.
    pub fn advance_token(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        expected_version: i64,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE doctor_queues SET
                next_token = next_token + 1,
                version = version + 1,
                updated_at = ?4
            WHERE doctor_id = ?1 AND queue_date = ?2 AND version = ?3
            "#,
            params![doctor_id, date.to_string(), expected_version, timestamp_now()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Point the serving slot at an appointment, or clear it.
    /// Returns false if the version moved.
    pub fn set_serving(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        expected_version: i64,
        appointment_id: Option<&str>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE doctor_queues SET
                serving_appointment_id = ?4,
                version = version + 1,
                updated_at = ?5
            WHERE doctor_id = ?1 AND queue_date = ?2 AND version = ?3
            "#,
            params![
                doctor_id,
                date.to_string(),
                expected_version,
                appointment_id,
                timestamp_now()
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// The appointment currently being served, if any.
    pub fn find_serving_appointment(
        &self,
        doctor_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<Appointment>> {
        let sql = format!(
            r#"
            SELECT {} FROM appointments ap
            WHERE ap.doctor_id = ?1 AND ap.queue_date = ?2 AND ap.queue_status = 'serving'
            "#,
            APPOINTMENT_COLUMNS
        );
        self.conn
            .query_row(&sql, params![doctor_id, date.to_string()], read_appointment_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// The waiting appointment with the lowest token.
    pub fn next_waiting_appointment(
        &self,
        doctor_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<Appointment>> {
        Ok(self
            .list_queue_appointments(doctor_id, date, QueueStatus::Waiting, Some(1))?
            .into_iter()
            .next())
    }

    /// Queue members in one queue status, lowest token first.
    pub fn list_queue_appointments(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        status: QueueStatus,
        limit: Option<u32>,
    ) -> DbResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            SELECT {} FROM appointments ap
            WHERE ap.doctor_id = ?1 AND ap.queue_date = ?2 AND ap.queue_status = ?3
            ORDER BY ap.token_number ASC
            LIMIT ?4
            "#,
            APPOINTMENT_COLUMNS
        );
        // SQLite treats a negative LIMIT as no limit
        let limit = limit.map(i64::from).unwrap_or(-1);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![doctor_id, date.to_string(), status.as_str(), limit],
            read_appointment_row,
        )?;

        let mut appointments = Vec::new();
        for row in rows {
            appointments.push(row?.try_into()?);
        }
        Ok(appointments)
    }
}
