//! Appointment models: booking status and queue membership.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::account::ContactCard;
use crate::error::{CoreError, CoreResult};

/// Booking status of an appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    /// Booked, awaiting confirmation
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "cancelled" | "canceled" => Some(AppointmentStatus::Cancelled),
            "completed" => Some(AppointmentStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed
        )
    }

    /// Statuses reachable from this one through a status update.
    pub fn valid_transitions(&self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentStatus::Pending => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Completed,
            ],
            AppointmentStatus::Confirmed => {
                &[AppointmentStatus::Cancelled, AppointmentStatus::Completed]
            }
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => &[],
        }
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Whether an appointment in this status may join a queue.
    pub fn is_queue_eligible(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        )
    }
}

/// Queue status, tracked apart from the booking status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Waiting,
    Serving,
    Completed,
    Missed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::Serving => "serving",
            QueueStatus::Completed => "completed",
            QueueStatus::Missed => "missed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(QueueStatus::Waiting),
            "serving" => Some(QueueStatus::Serving),
            "completed" => Some(QueueStatus::Completed),
            "missed" => Some(QueueStatus::Missed),
            _ => None,
        }
    }

    /// Still occupying a place in the line.
    pub fn is_active(&self) -> bool {
        matches!(self, QueueStatus::Waiting | QueueStatus::Serving)
    }
}

/// Queue membership assigned on admission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSlot {
    /// Queue day
    pub queue_date: NaiveDate,
    /// Token number, unique per doctor per day
    pub token: u32,
    pub status: QueueStatus,
}

/// A booked consultation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    /// Unique appointment ID
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: AppointmentStatus,
    /// Reason for visit
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// `None` until admitted into the doctor's queue
    pub queue: Option<QueueSlot>,
    /// Optimistic concurrency version
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Appointment {
    /// Whether `user_id` is the doctor or the patient of this appointment.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.doctor_id == user_id || self.patient_id == user_id
    }

    /// Day whose queue this appointment joins.
    pub fn queue_day(&self) -> NaiveDate {
        self.start_time.date_naive()
    }

    pub fn queue_status(&self) -> Option<QueueStatus> {
        self.queue.as_ref().map(|q| q.status)
    }

    pub fn token(&self) -> Option<u32> {
        self.queue.as_ref().map(|q| q.token)
    }
}

/// Input for booking a consultation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingRequest {
    pub patient_id: String,
    pub doctor_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl BookingRequest {
    /// Validate and turn into a new pending appointment.
    pub fn into_appointment(self) -> CoreResult<Appointment> {
        if self.patient_id.trim().is_empty() {
            return Err(CoreError::Validation("patient is required".into()));
        }
        if self.doctor_id.trim().is_empty() {
            return Err(CoreError::Validation("doctor is required".into()));
        }
        let start_time = self
            .start_time
            .ok_or_else(|| CoreError::Validation("start time is required".into()))?;
        if let Some(end) = self.end_time {
            if end <= start_time {
                return Err(CoreError::Validation(
                    "end time must be after start time".into(),
                ));
            }
        }

        let now = crate::models::timestamp_now();
        Ok(Appointment {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            start_time,
            end_time: self.end_time,
            status: AppointmentStatus::Pending,
            reason: self.reason,
            notes: self.notes,
            queue: None,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

/// An appointment with the other party's contact details attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentView {
    pub appointment: Appointment,
    /// Patient for doctor listings, doctor for patient listings
    pub counterpart: Option<ContactCard>,
}
