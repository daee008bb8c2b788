//! Appointment database operations.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{
    format_timestamp, timestamp_now, Appointment, AppointmentStatus, ContactCard, QueueSlot,
    QueueStatus,
};

pub(crate) const APPOINTMENT_COLUMNS: &str = r#"
    ap.id, ap.patient_id, ap.doctor_id, ap.start_time, ap.end_time, ap.status,
    ap.reason, ap.notes, ap.queue_date, ap.token_number, ap.queue_status,
    ap.version, ap.created_at, ap.updated_at
"#;

/// Which participant a listing is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Doctor,
    Patient,
}

impl Database {
    /// Insert a new appointment.
    pub fn insert_appointment(&self, appointment: &Appointment) -> DbResult<()> {
        let slot = appointment.queue.as_ref();
        self.conn.execute(
            r#"
            INSERT INTO appointments (
                id, patient_id, doctor_id, start_time, end_time, status, reason, notes,
                queue_date, token_number, queue_status, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                appointment.id,
                appointment.patient_id,
                appointment.doctor_id,
                format_timestamp(&appointment.start_time),
                appointment.end_time.as_ref().map(format_timestamp),
                appointment.status.as_str(),
                appointment.reason,
                appointment.notes,
                slot.map(|s| s.queue_date.to_string()),
                slot.map(|s| s.token),
                slot.map(|s| s.status.as_str()),
                appointment.version,
                appointment.created_at,
                appointment.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, id: &str) -> DbResult<Option<Appointment>> {
        let sql = format!(
            "SELECT {} FROM appointments ap WHERE ap.id = ?",
            APPOINTMENT_COLUMNS
        );
        self.conn
            .query_row(&sql, [id], read_appointment_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get an appointment that must exist.
    pub fn require_appointment(&self, id: &str) -> DbResult<Appointment> {
        self.get_appointment(id)?
            .ok_or_else(|| DbError::NotFound(format!("appointment {}", id)))
    }

    /// Appointments of one participant by start time, with the other party's card.
    pub fn list_appointments_for(
        &self,
        participant: Participant,
        user_id: &str,
    ) -> DbResult<Vec<(Appointment, Option<ContactCard>)>> {
        let (own, other) = match participant {
            Participant::Doctor => ("ap.doctor_id", "ap.patient_id"),
            Participant::Patient => ("ap.patient_id", "ap.doctor_id"),
        };
        let sql = format!(
            r#"
            SELECT {}, c.id, c.name, c.phone
            FROM appointments ap
            LEFT JOIN accounts c ON c.id = {}
            WHERE {} = ?
            ORDER BY ap.start_time ASC, ap.created_at ASC, ap.id ASC
            "#,
            APPOINTMENT_COLUMNS, other, own
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], |row| {
            let card = match row.get::<_, Option<String>>(14)? {
                Some(id) => Some(ContactCard {
                    id,
                    name: row.get(15)?,
                    phone: row.get(16)?,
                }),
                None => None,
            };
            Ok((read_appointment_row(row)?, card))
        })?;

        let mut appointments = Vec::new();
        for row in rows {
            let (appointment_row, card) = row?;
            appointments.push((appointment_row.try_into()?, card));
        }
        Ok(appointments)
    }

    /// Set booking status if the stored version still matches.
    pub fn update_appointment_status(
        &self,
        id: &str,
        expected_version: i64,
        status: AppointmentStatus,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE appointments SET
                status = ?3,
                version = version + 1,
                updated_at = ?4
            WHERE id = ?1 AND version = ?2
            "#,
            params![id, expected_version, status.as_str(), timestamp_now()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Assign or change queue membership if the stored version still matches.
    pub fn set_queue_slot(
        &self,
        id: &str,
        expected_version: i64,
        slot: &QueueSlot,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE appointments SET
                queue_date = ?3,
                token_number = ?4,
                queue_status = ?5,
                version = version + 1,
                updated_at = ?6
            WHERE id = ?1 AND version = ?2
            "#,
            params![
                id,
                expected_version,
                slot.queue_date.to_string(),
                slot.token,
                slot.status.as_str(),
                timestamp_now(),
            ],
        )?;
        Ok(rows_affected > 0)
    }
}

pub(crate) fn read_appointment_row(row: &Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        status: row.get(5)?,
        reason: row.get(6)?,
        notes: row.get(7)?,
        queue_date: row.get(8)?,
        token_number: row.get(9)?,
        queue_status: row.get(10)?,
        version: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Intermediate row struct for database mapping.
pub(crate) struct AppointmentRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    start_time: String,
    end_time: Option<String>,
    status: String,
    reason: Option<String>,
    notes: Option<String>,
    queue_date: Option<String>,
    token_number: Option<u32>,
    queue_status: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DbError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let status = AppointmentStatus::parse(&row.status).ok_or_else(|| {
            DbError::Constraint(format!("Unknown appointment status: {}", row.status))
        })?;

        let queue = match (row.queue_date, row.token_number, row.queue_status) {
            (Some(date), Some(token), Some(queue_status)) => Some(QueueSlot {
                queue_date: parse_date(&date)?,
                token,
                status: QueueStatus::parse(&queue_status).ok_or_else(|| {
                    DbError::Constraint(format!("Unknown queue status: {}", queue_status))
                })?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(DbError::Constraint(format!(
                    "Appointment {} has partial queue membership",
                    row.id
                )))
            }
        };

        Ok(Appointment {
            start_time: parse_timestamp(&row.start_time)?,
            end_time: row.end_time.as_deref().map(parse_timestamp).transpose()?,
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            status,
            reason: row.reason,
            notes: row.notes,
            queue,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn parse_timestamp(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Constraint(format!("Invalid timestamp {}: {}", s, e)))
}

pub(crate) fn parse_date(s: &str) -> DbResult<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| DbError::Constraint(format!("Invalid date {}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, BookingRequest, Role};
    use chrono::TimeZone;

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let mut doctor = Account::new("doc-1".into(), Role::Doctor, "Dr. Meera Rao".into());
        doctor.phone = Some("111".into());
        db.upsert_account(&doctor).unwrap();
        let mut patient = Account::new("pat-1".into(), Role::Patient, "Arjun".into());
        patient.phone = Some("222".into());
        db.upsert_account(&patient).unwrap();
        db
    }

    fn book(hour: u32) -> Appointment {
        BookingRequest {
            patient_id: "pat-1".into(),
            doctor_id: "doc-1".into(),
            start_time: Some(Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()),
            reason: Some("checkup".into()),
            ..Default::default()
        }
        .into_appointment()
        .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();
        let appt = book(9);
        db.insert_appointment(&appt).unwrap();

        let retrieved = db.get_appointment(&appt.id).unwrap().unwrap();
        assert_eq!(retrieved, appt);
        assert!(db.get_appointment("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_orders_by_start_and_attaches_counterpart() {
        let db = setup_db();
        let late = book(15);
        let early = book(9);
        db.insert_appointment(&late).unwrap();
        db.insert_appointment(&early).unwrap();

        let for_doctor = db
            .list_appointments_for(Participant::Doctor, "doc-1")
            .unwrap();
        assert_eq!(for_doctor.len(), 2);
        assert_eq!(for_doctor[0].0.id, early.id);
        assert_eq!(for_doctor[1].0.id, late.id);
        let card = for_doctor[0].1.as_ref().unwrap();
        assert_eq!(card.name, "Arjun");
        assert_eq!(card.phone.as_deref(), Some("222"));

        let for_patient = db
            .list_appointments_for(Participant::Patient, "pat-1")
            .unwrap();
        assert_eq!(for_patient[0].1.as_ref().unwrap().name, "Dr. Meera Rao");
    }

    #[test]
    fn test_status_update_checks_version() {
        let db = setup_db();
        let appt = book(9);
        db.insert_appointment(&appt).unwrap();

        assert!(db
            .update_appointment_status(&appt.id, 0, AppointmentStatus::Confirmed)
            .unwrap());
        assert!(!db
            .update_appointment_status(&appt.id, 0, AppointmentStatus::Cancelled)
            .unwrap());

        let retrieved = db.get_appointment(&appt.id).unwrap().unwrap();
        assert_eq!(retrieved.status, AppointmentStatus::Confirmed);
        assert_eq!(retrieved.version, 1);
    }

    #[test]
    fn test_set_queue_slot() {
        let db = setup_db();
        let appt = book(9);
        db.insert_appointment(&appt).unwrap();

        let slot = QueueSlot {
            queue_date: appt.queue_day(),
            token: 1,
            status: QueueStatus::Waiting,
        };
        assert!(db.set_queue_slot(&appt.id, 0, &slot).unwrap());

        let retrieved = db.get_appointment(&appt.id).unwrap().unwrap();
        assert_eq!(retrieved.queue, Some(slot));
    }
}
