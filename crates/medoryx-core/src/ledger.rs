//! Appointment ledger: booking, listings and status transitions.
//!
//! Status changes keep the queue in step with the booking: cancelling or
//! completing an admitted appointment takes it out of the active line in the
//! same transaction, and confirming can admit it.

use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::db::{Database, Participant};
use crate::error::{retry_on_conflict, CoreError, CoreResult};
use crate::models::{Appointment, AppointmentStatus, AppointmentView, BookingRequest, QueueStatus, Role};
use crate::queue::{admit_in_transaction, release_in_transaction, DoctorLocks};

pub struct AppointmentLedger<'a> {
    db: &'a Database,
    locks: &'a DoctorLocks,
    config: &'a QueueConfig,
}

impl<'a> AppointmentLedger<'a> {
    pub fn new(db: &'a Database, locks: &'a DoctorLocks, config: &'a QueueConfig) -> Self {
        Self { db, locks, config }
    }

    /// Book a consultation. The new appointment is pending and not admitted.
    pub fn book(&self, request: BookingRequest) -> CoreResult<Appointment> {
        let appointment = request.into_appointment()?;

        let doctor = self
            .db
            .get_account(&appointment.doctor_id)?
            .filter(|a| a.role == Role::Doctor)
            .ok_or_else(|| CoreError::NotFound(format!("doctor {}", appointment.doctor_id)))?;

        self.db.insert_appointment(&appointment)?;
        info!(
            appointment_id = %appointment.id,
            doctor_id = %doctor.id,
            patient_id = %appointment.patient_id,
            start_time = %appointment.start_time,
            "appointment booked"
        );
        Ok(appointment)
    }

    pub fn get(&self, appointment_id: &str) -> CoreResult<Appointment> {
        Ok(self.db.require_appointment(appointment_id)?)
    }

    /// A doctor's appointments by start time, each with the patient's card.
    pub fn list_for_doctor(&self, doctor_id: &str) -> CoreResult<Vec<AppointmentView>> {
        self.list(Participant::Doctor, doctor_id)
    }

    /// A patient's appointments by start time, each with the doctor's card.
    pub fn list_for_patient(&self, patient_id: &str) -> CoreResult<Vec<AppointmentView>> {
        self.list(Participant::Patient, patient_id)
    }

    fn list(&self, participant: Participant, user_id: &str) -> CoreResult<Vec<AppointmentView>> {
        let rows = self.db.list_appointments_for(participant, user_id)?;
        debug!(user_id, ?participant, count = rows.len(), "appointments listed");
        Ok(rows
            .into_iter()
            .map(|(appointment, counterpart)| AppointmentView {
                appointment,
                counterpart,
            })
            .collect())
    }

    /// Move a booking to `confirmed`, `cancelled` or `completed`.
    ///
    /// Only the doctor or the patient may do this. A concurrent change to the
    /// same appointment is retried once against the fresh record.
    pub fn update_status(
        &self,
        appointment_id: &str,
        requester_id: &str,
        new_status: AppointmentStatus,
    ) -> CoreResult<Appointment> {
        let appointment = self.db.require_appointment(appointment_id)?;
        if !appointment.is_participant(requester_id) {
            warn!(appointment_id, requester_id, "status update rejected: not a participant");
            return Err(CoreError::Unauthorized(format!(
                "{} is not a participant of appointment {}",
                requester_id, appointment_id
            )));
        }

        self.locks.with_doctor(&appointment.doctor_id, || {
            retry_on_conflict("update_status", || {
                self.apply_status(appointment_id, new_status)
            })
        })
    }

    fn apply_status(
        &self,
        appointment_id: &str,
        new_status: AppointmentStatus,
    ) -> CoreResult<Appointment> {
        let tx = self.db.write_transaction()?;
        let current = self.db.require_appointment(appointment_id)?;

        if current.status.is_terminal() {
            warn!(
                appointment_id,
                status = current.status.as_str(),
                "status update on closed appointment"
            );
            return Err(CoreError::Validation(format!(
                "appointment {} is already {}",
                appointment_id,
                current.status.as_str()
            )));
        }
        if !current.status.can_transition_to(new_status) {
            warn!(
                appointment_id,
                from = current.status.as_str(),
                to = new_status.as_str(),
                "invalid status transition"
            );
            return Err(CoreError::Validation(format!(
                "appointment {} cannot go from {} to {}",
                appointment_id,
                current.status.as_str(),
                new_status.as_str()
            )));
        }

        if !self
            .db
            .update_appointment_status(appointment_id, current.version, new_status)?
        {
            return Err(CoreError::Conflict(format!(
                "appointment {} changed since version {}",
                appointment_id, current.version
            )));
        }
        let updated = self.db.require_appointment(appointment_id)?;

        match new_status {
            AppointmentStatus::Cancelled => {
                release_in_transaction(self.db, &updated, QueueStatus::Missed)?;
            }
            AppointmentStatus::Completed => {
                release_in_transaction(self.db, &updated, QueueStatus::Completed)?;
            }
            AppointmentStatus::Confirmed
                if self.config.auto_admit_on_confirm && updated.queue.is_none() =>
            {
                let slot = admit_in_transaction(self.db, &updated)?;
                debug!(appointment_id, token = slot.token, "admitted on confirmation");
            }
            _ => {}
        }
        tx.commit()?;

        let appointment = self.db.require_appointment(appointment_id)?;
        info!(
            appointment_id,
            from = current.status.as_str(),
            to = new_status.as_str(),
            queue_status = ?appointment.queue_status(),
            "appointment status updated"
        );
        Ok(appointment)
    }
}
