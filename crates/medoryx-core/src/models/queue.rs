//! Live queue snapshots and call-next outcomes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::appointment::{Appointment, QueueStatus};

/// One appointment as seen from the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub appointment_id: String,
    pub patient_id: String,
    pub token: u32,
    pub status: QueueStatus,
    pub start_time: DateTime<Utc>,
}

impl QueueEntry {
    /// Build from an admitted appointment; `None` if it has no queue slot.
    pub fn from_appointment(appointment: &Appointment) -> Option<Self> {
        let slot = appointment.queue.as_ref()?;
        Some(Self {
            appointment_id: appointment.id.clone(),
            patient_id: appointment.patient_id.clone(),
            token: slot.token,
            status: slot.status,
            start_time: appointment.start_time,
        })
    }
}

/// Consistent snapshot of one doctor's queue for one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveQueue {
    pub doctor_id: String,
    pub queue_date: NaiveDate,
    pub serving: Option<QueueEntry>,
    /// Waiting entries, lowest token first
    pub waiting: Vec<QueueEntry>,
    /// Queue version the snapshot was read at
    pub version: i64,
}

impl LiveQueue {
    /// Token currently being served.
    pub fn current_token(&self) -> Option<u32> {
        self.serving.as_ref().map(|e| e.token)
    }

    /// 1-based position of an appointment in the waiting line.
    pub fn position_of(&self, appointment_id: &str) -> Option<usize> {
        self.waiting
            .iter()
            .position(|e| e.appointment_id == appointment_id)
            .map(|i| i + 1)
    }
}

/// Result of advancing a doctor's queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CallNextOutcome {
    /// A waiting patient is now being served.
    Serving {
        now_serving: QueueEntry,
        /// Previously served entry, now completed
        completed: Option<QueueEntry>,
    },
    /// Nobody is waiting; the serving slot is empty.
    NoPatientsWaiting {
        /// Previously served entry, now completed
        completed: Option<QueueEntry>,
    },
}

impl CallNextOutcome {
    pub fn now_serving(&self) -> Option<&QueueEntry> {
        match self {
            CallNextOutcome::Serving { now_serving, .. } => Some(now_serving),
            CallNextOutcome::NoPatientsWaiting { .. } => None,
        }
    }

    pub fn completed(&self) -> Option<&QueueEntry> {
        match self {
            CallNextOutcome::Serving { completed, .. } => completed.as_ref(),
            CallNextOutcome::NoPatientsWaiting { completed } => completed.as_ref(),
        }
    }
}
