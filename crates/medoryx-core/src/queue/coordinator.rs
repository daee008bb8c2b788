//! Queue coordinator: admission, advancement and live snapshots.
//!
//! Every mutation runs under the doctor's lock and inside one IMMEDIATE
//! transaction, and every row it touches is version-checked. A failed check
//! aborts the whole transaction with [`CoreError::Conflict`].

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::DoctorLocks;
use crate::db::Database;
use crate::error::{retry_on_conflict, CoreError, CoreResult};
use crate::models::{Appointment, CallNextOutcome, LiveQueue, QueueEntry, QueueSlot, QueueStatus};

/// Drives the per-doctor waiting line and serving slot.
pub struct QueueCoordinator<'a> {
    db: &'a Database,
    locks: &'a DoctorLocks,
}

impl<'a> QueueCoordinator<'a> {
    pub fn new(db: &'a Database, locks: &'a DoctorLocks) -> Self {
        Self { db, locks }
    }

    /// Give an appointment the next token of its doctor's day.
    ///
    /// Fails with [`CoreError::AlreadyAdmitted`] if it already holds a token.
    pub fn admit(&self, appointment_id: &str, requester_id: &str) -> CoreResult<Appointment> {
        let appointment = self.db.require_appointment(appointment_id)?;
        if !appointment.is_participant(requester_id) {
            warn!(appointment_id, requester_id, "admit rejected: not a participant");
            return Err(CoreError::Unauthorized(format!(
                "{} is not a participant of appointment {}",
                requester_id, appointment_id
            )));
        }

        self.locks.with_doctor(&appointment.doctor_id, || {
            let tx = self.db.write_transaction()?;
            let current = self.db.require_appointment(appointment_id)?;
            let slot = admit_in_transaction(self.db, &current)?;
            tx.commit()?;

            info!(
                appointment_id,
                doctor_id = %current.doctor_id,
                queue_date = %slot.queue_date,
                token = slot.token,
                "appointment admitted"
            );
            Ok(self.db.require_appointment(appointment_id)?)
        })
    }

    /// Complete whoever is being served and serve the lowest waiting token.
    ///
    /// With `expected_version` set, the call only applies if the queue is
    /// still at the version the caller last saw.
    pub fn call_next(
        &self,
        doctor_id: &str,
        requester_id: &str,
        date: NaiveDate,
        expected_version: Option<i64>,
    ) -> CoreResult<CallNextOutcome> {
        if requester_id != doctor_id {
            warn!(doctor_id, requester_id, "call next rejected: not the doctor");
            return Err(CoreError::Unauthorized(format!(
                "only doctor {} can advance their queue",
                doctor_id
            )));
        }

        self.locks.with_doctor(doctor_id, || {
            retry_on_conflict("call_next", || {
                self.advance(doctor_id, date, expected_version)
            })
        })
    }

    fn advance(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        expected_version: Option<i64>,
    ) -> CoreResult<CallNextOutcome> {
        let tx = self.db.write_transaction()?;

        let version = self
            .db
            .get_queue_state(doctor_id, date)?
            .map(|s| s.version)
            .unwrap_or(0);
        if let Some(expected) = expected_version {
            if expected != version {
                return Err(CoreError::Conflict(format!(
                    "queue of {} on {} is at version {}, expected {}",
                    doctor_id, date, version, expected
                )));
            }
        }

        let serving = self.db.find_serving_appointment(doctor_id, date)?;
        let next = self.db.next_waiting_appointment(doctor_id, date)?;
        if serving.is_none() && next.is_none() {
            debug!(doctor_id, %date, "no patients waiting");
            return Ok(CallNextOutcome::NoPatientsWaiting { completed: None });
        }

        self.db.ensure_queue_row(doctor_id, date)?;
        let completed = serving
            .map(|current| move_to(self.db, &current, QueueStatus::Completed))
            .transpose()?;
        let now_serving = next
            .map(|waiting| move_to(self.db, &waiting, QueueStatus::Serving))
            .transpose()?;

        let serving_id = now_serving.as_ref().map(|e| e.appointment_id.as_str());
        if !self.db.set_serving(doctor_id, date, version, serving_id)? {
            return Err(CoreError::Conflict(format!(
                "queue of {} on {} changed concurrently",
                doctor_id, date
            )));
        }
        tx.commit()?;

        info!(
            doctor_id,
            %date,
            now_serving = ?now_serving.as_ref().map(|e| e.token),
            completed = ?completed.as_ref().map(|e| e.token),
            "queue advanced"
        );
        Ok(match now_serving {
            Some(now_serving) => CallNextOutcome::Serving {
                now_serving,
                completed,
            },
            None => CallNextOutcome::NoPatientsWaiting { completed },
        })
    }

    /// Mark a waiting appointment as missed. Other tokens keep their numbers.
    pub fn skip(&self, appointment_id: &str, requester_id: &str) -> CoreResult<Appointment> {
        let appointment = self.db.require_appointment(appointment_id)?;
        if appointment.doctor_id != requester_id {
            warn!(appointment_id, requester_id, "skip rejected: not the doctor");
            return Err(CoreError::Unauthorized(format!(
                "only doctor {} can skip appointment {}",
                appointment.doctor_id, appointment_id
            )));
        }

        self.locks.with_doctor(&appointment.doctor_id, || {
            let tx = self.db.write_transaction()?;
            let current = self.db.require_appointment(appointment_id)?;
            if current.queue_status() != Some(QueueStatus::Waiting) {
                return Err(CoreError::Validation(format!(
                    "appointment {} is not waiting in a queue",
                    appointment_id
                )));
            }
            let entry = move_to(self.db, &current, QueueStatus::Missed)?;
            tx.commit()?;

            info!(appointment_id, token = entry.token, "appointment skipped");
            Ok(self.db.require_appointment(appointment_id)?)
        })
    }

    /// Serving entry and waiting line as of one consistent read.
    pub fn live_queue(&self, doctor_id: &str, date: NaiveDate) -> CoreResult<LiveQueue> {
        let tx = self.db.read_transaction()?;
        let version = self
            .db
            .get_queue_state(doctor_id, date)?
            .map(|s| s.version)
            .unwrap_or(0);
        let serving = self
            .db
            .find_serving_appointment(doctor_id, date)?
            .as_ref()
            .and_then(QueueEntry::from_appointment);
        let waiting = self
            .db
            .list_queue_appointments(doctor_id, date, QueueStatus::Waiting, None)?
            .iter()
            .filter_map(QueueEntry::from_appointment)
            .collect::<Vec<_>>();
        tx.commit()?;

        debug!(doctor_id, %date, waiting = waiting.len(), version, "live queue read");
        Ok(LiveQueue {
            doctor_id: doctor_id.to_string(),
            queue_date: date,
            serving,
            waiting,
            version,
        })
    }
}

/// Assign the next token. Caller holds the doctor's lock and an open write
/// transaction.
pub(crate) fn admit_in_transaction(db: &Database, appointment: &Appointment) -> CoreResult<QueueSlot> {
    if let Some(slot) = &appointment.queue {
        return Err(CoreError::AlreadyAdmitted(format!(
            "appointment {} already holds token {} for {}",
            appointment.id, slot.token, slot.queue_date
        )));
    }
    if !appointment.status.is_queue_eligible() {
        return Err(CoreError::Validation(format!(
            "appointment {} is {} and cannot join a queue",
            appointment.id,
            appointment.status.as_str()
        )));
    }

    let day = appointment.queue_day();
    db.ensure_queue_row(&appointment.doctor_id, day)?;
    let state = db
        .get_queue_state(&appointment.doctor_id, day)?
        .ok_or_else(|| CoreError::Conflict(format!("queue of {} vanished", appointment.doctor_id)))?;
    if !db.advance_token(&appointment.doctor_id, day, state.version)? {
        return Err(CoreError::Conflict(format!(
            "queue of {} on {} changed concurrently",
            appointment.doctor_id, day
        )));
    }

    let slot = QueueSlot {
        queue_date: day,
        token: state.next_token,
        status: QueueStatus::Waiting,
    };
    if !db.set_queue_slot(&appointment.id, appointment.version, &slot)? {
        return Err(stale(appointment));
    }
    Ok(slot)
}

/// Take an appointment out of the active line after its booking ended.
///
/// A waiting entry moves to `outcome`; a serving entry is completed and the
/// doctor's serving slot cleared. Caller holds the doctor's lock and an open
/// write transaction.
pub(crate) fn release_in_transaction(
    db: &Database,
    appointment: &Appointment,
    outcome: QueueStatus,
) -> CoreResult<Option<QueueEntry>> {
    let slot = match &appointment.queue {
        Some(slot) if slot.status.is_active() => slot,
        _ => return Ok(None),
    };

    if slot.status == QueueStatus::Waiting {
        return move_to(db, appointment, outcome).map(Some);
    }

    let entry = move_to(db, appointment, QueueStatus::Completed)?;
    if let Some(state) = db.get_queue_state(&appointment.doctor_id, slot.queue_date)? {
        if state.serving_appointment_id.as_deref() == Some(appointment.id.as_str())
            && !db.set_serving(&appointment.doctor_id, slot.queue_date, state.version, None)?
        {
            return Err(stale(appointment));
        }
    }
    Ok(Some(entry))
}

/// Move an admitted appointment to another queue status.
fn move_to(db: &Database, appointment: &Appointment, status: QueueStatus) -> CoreResult<QueueEntry> {
    let slot = appointment.queue.as_ref().ok_or_else(|| {
        CoreError::Validation(format!("appointment {} is not in a queue", appointment.id))
    })?;
    let updated = QueueSlot {
        status,
        ..slot.clone()
    };
    if !db.set_queue_slot(&appointment.id, appointment.version, &updated)? {
        return Err(stale(appointment));
    }

    Ok(QueueEntry {
        appointment_id: appointment.id.clone(),
        patient_id: appointment.patient_id.clone(),
        token: slot.token,
        status,
        start_time: appointment.start_time,
    })
}

fn stale(appointment: &Appointment) -> CoreError {
    CoreError::Conflict(format!(
        "appointment {} changed since version {}",
        appointment.id, appointment.version
    ))
}
