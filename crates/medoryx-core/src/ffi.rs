//! Flat record types exchanged with the host application.
//!
//! Timestamps cross the boundary as RFC 3339 strings and calendar dates as
//! `YYYY-MM-DD`; statuses and roles as their lowercase names.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{CoreError, CoreResult};
use crate::geo::GeoPoint;
use crate::models::{
    format_timestamp, Account, Appointment, AppointmentView, BedAvailability, BedType, BedUpdate,
    BookingRequest, CallNextOutcome, ContactCard, HospitalMatch, LiveQueue, Medicine,
    MedicineMatch, MedicineUpdate, QueueEntry, Role, SearchFilter,
};

pub(crate) fn parse_date(field: &str, value: &str) -> CoreResult<NaiveDate> {
    value
        .trim()
        .parse::<NaiveDate>()
        .map_err(|e| CoreError::Validation(format!("{} must be YYYY-MM-DD: {}", field, e)))
}

pub(crate) fn parse_time(field: &str, value: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Validation(format!("{} must be RFC 3339: {}", field, e)))
}

/// FFI-safe coordinate.
#[derive(Debug, Clone, Copy, uniffi::Record)]
pub struct FfiGeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl From<GeoPoint> for FfiGeoPoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            longitude: point.longitude,
            latitude: point.latitude,
        }
    }
}

impl TryFrom<FfiGeoPoint> for GeoPoint {
    type Error = CoreError;

    fn try_from(point: FfiGeoPoint) -> CoreResult<Self> {
        GeoPoint::new(point.longitude, point.latitude)
    }
}

/// FFI-safe bed counts.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBedAvailability {
    pub total_beds: u32,
    pub icu_available: u32,
    pub nicu_available: u32,
    pub ventilators_available: u32,
    pub general_beds_available: u32,
    /// Derived sum of the four categories; ignored on input
    pub beds_available: u32,
}

impl From<BedAvailability> for FfiBedAvailability {
    fn from(beds: BedAvailability) -> Self {
        Self {
            beds_available: beds.beds_available(),
            total_beds: beds.total_beds,
            icu_available: beds.icu_available,
            nicu_available: beds.nicu_available,
            ventilators_available: beds.ventilators_available,
            general_beds_available: beds.general_beds_available,
        }
    }
}

impl From<FfiBedAvailability> for BedAvailability {
    fn from(beds: FfiBedAvailability) -> Self {
        Self {
            total_beds: beds.total_beds,
            icu_available: beds.icu_available,
            nicu_available: beds.nicu_available,
            ventilators_available: beds.ventilators_available,
            general_beds_available: beds.general_beds_available,
        }
    }
}

/// FFI-safe partial bed update.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiBedUpdate {
    pub total_beds: Option<u32>,
    pub icu_available: Option<u32>,
    pub nicu_available: Option<u32>,
    pub ventilators_available: Option<u32>,
    pub general_beds_available: Option<u32>,
}

impl From<FfiBedUpdate> for BedUpdate {
    fn from(update: FfiBedUpdate) -> Self {
        Self {
            total_beds: update.total_beds,
            icu_available: update.icu_available,
            nicu_available: update.nicu_available,
            ventilators_available: update.ventilators_available,
            general_beds_available: update.general_beds_available,
        }
    }
}

/// FFI-safe directory record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAccount {
    pub id: String,
    /// patient, doctor, pharmacy or hospital
    pub role: String,
    pub name: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub location: Option<FfiGeoPoint>,
    pub beds: Option<FfiBedAvailability>,
}

impl From<Account> for FfiAccount {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            role: account.role.as_str().to_string(),
            name: account.name,
            phone: account.phone,
            city: account.city,
            area: account.area,
            location: account.location.map(Into::into),
            beds: account.beds.map(Into::into),
        }
    }
}

impl TryFrom<FfiAccount> for Account {
    type Error = CoreError;

    fn try_from(account: FfiAccount) -> CoreResult<Self> {
        let role = Role::parse(&account.role)
            .ok_or_else(|| CoreError::Validation(format!("unknown role: {}", account.role)))?;
        Ok(Account {
            id: account.id,
            role,
            name: account.name,
            phone: account.phone,
            city: account.city,
            area: account.area,
            location: account.location.map(GeoPoint::try_from).transpose()?,
            beds: account.beds.map(Into::into),
        })
    }
}

/// FFI-safe contact card.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiContactCard {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
}

impl From<ContactCard> for FfiContactCard {
    fn from(card: ContactCard) -> Self {
        Self {
            id: card.id,
            name: card.name,
            phone: card.phone,
        }
    }
}

/// FFI-safe booking request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBookingRequest {
    pub patient_id: String,
    pub doctor_id: String,
    /// RFC 3339; required
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl TryFrom<FfiBookingRequest> for BookingRequest {
    type Error = CoreError;

    fn try_from(request: FfiBookingRequest) -> CoreResult<Self> {
        Ok(BookingRequest {
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            start_time: request
                .start_time
                .as_deref()
                .map(|s| parse_time("start_time", s))
                .transpose()?,
            end_time: request
                .end_time
                .as_deref()
                .map(|s| parse_time("end_time", s))
                .transpose()?,
            reason: request.reason,
            notes: request.notes,
        })
    }
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: String,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub queue_date: Option<String>,
    pub token: Option<u32>,
    pub queue_status: Option<String>,
    pub version: i64,
}

impl From<Appointment> for FfiAppointment {
    fn from(appointment: Appointment) -> Self {
        let queue = appointment.queue.as_ref();
        Self {
            queue_date: queue.map(|q| q.queue_date.to_string()),
            token: queue.map(|q| q.token),
            queue_status: queue.map(|q| q.status.as_str().to_string()),
            start_time: format_timestamp(&appointment.start_time),
            end_time: appointment.end_time.as_ref().map(format_timestamp),
            status: appointment.status.as_str().to_string(),
            id: appointment.id,
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            reason: appointment.reason,
            notes: appointment.notes,
            version: appointment.version,
        }
    }
}

/// FFI-safe appointment with the other party's card.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointmentView {
    pub appointment: FfiAppointment,
    pub counterpart: Option<FfiContactCard>,
}

impl From<AppointmentView> for FfiAppointmentView {
    fn from(view: AppointmentView) -> Self {
        Self {
            appointment: view.appointment.into(),
            counterpart: view.counterpart.map(Into::into),
        }
    }
}

/// FFI-safe queue entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQueueEntry {
    pub appointment_id: String,
    pub patient_id: String,
    pub token: u32,
    pub status: String,
    pub start_time: String,
}

impl From<QueueEntry> for FfiQueueEntry {
    fn from(entry: QueueEntry) -> Self {
        Self {
            appointment_id: entry.appointment_id,
            patient_id: entry.patient_id,
            token: entry.token,
            status: entry.status.as_str().to_string(),
            start_time: format_timestamp(&entry.start_time),
        }
    }
}

/// FFI-safe live queue snapshot.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLiveQueue {
    pub doctor_id: String,
    pub queue_date: String,
    pub serving: Option<FfiQueueEntry>,
    pub waiting: Vec<FfiQueueEntry>,
    pub version: i64,
}

impl From<LiveQueue> for FfiLiveQueue {
    fn from(queue: LiveQueue) -> Self {
        Self {
            doctor_id: queue.doctor_id,
            queue_date: queue.queue_date.to_string(),
            serving: queue.serving.map(Into::into),
            waiting: queue.waiting.into_iter().map(Into::into).collect(),
            version: queue.version,
        }
    }
}

/// FFI-safe call-next result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCallNextOutcome {
    pub no_patients_waiting: bool,
    pub now_serving: Option<FfiQueueEntry>,
    pub completed: Option<FfiQueueEntry>,
}

impl From<CallNextOutcome> for FfiCallNextOutcome {
    fn from(outcome: CallNextOutcome) -> Self {
        match outcome {
            CallNextOutcome::Serving {
                now_serving,
                completed,
            } => Self {
                no_patients_waiting: false,
                now_serving: Some(now_serving.into()),
                completed: completed.map(Into::into),
            },
            CallNextOutcome::NoPatientsWaiting { completed } => Self {
                no_patients_waiting: true,
                now_serving: None,
                completed: completed.map(Into::into),
            },
        }
    }
}

/// FFI-safe medicine.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedicine {
    pub id: String,
    pub pharmacy_id: String,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub stock: u32,
    pub expiry_date: String,
    pub batch_number: Option<String>,
    pub dosage_form: Option<String>,
    pub strength: Option<String>,
    pub on_marketplace: bool,
    pub marketplace_price: Option<f64>,
    pub on_exchange: bool,
    pub exchange_price: Option<f64>,
    pub version: i64,
}

impl From<Medicine> for FfiMedicine {
    fn from(medicine: Medicine) -> Self {
        Self {
            on_marketplace: medicine.marketplace.is_some(),
            marketplace_price: medicine.marketplace.as_ref().and_then(|l| l.discount_price),
            on_exchange: medicine.exchange.is_some(),
            exchange_price: medicine.exchange.as_ref().and_then(|l| l.discount_price),
            expiry_date: medicine.expiry_date.to_string(),
            id: medicine.id,
            pharmacy_id: medicine.pharmacy_id,
            name: medicine.name,
            brand: medicine.brand,
            category: medicine.category,
            price: medicine.price,
            stock: medicine.stock,
            batch_number: medicine.batch_number,
            dosage_form: medicine.dosage_form,
            strength: medicine.strength,
            version: medicine.version,
        }
    }
}

/// FFI-safe input for a new medicine.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewMedicine {
    pub pharmacy_id: String,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub stock: u32,
    pub expiry_date: String,
    pub batch_number: Option<String>,
    pub dosage_form: Option<String>,
    pub strength: Option<String>,
}

impl TryFrom<FfiNewMedicine> for Medicine {
    type Error = CoreError;

    fn try_from(input: FfiNewMedicine) -> CoreResult<Self> {
        let expiry = parse_date("expiry_date", &input.expiry_date)?;
        let mut medicine = Medicine::new(input.pharmacy_id, input.name, input.price, input.stock, expiry);
        medicine.brand = input.brand;
        medicine.category = input.category;
        medicine.batch_number = input.batch_number;
        medicine.dosage_form = input.dosage_form;
        medicine.strength = input.strength;
        Ok(medicine)
    }
}

/// FFI-safe partial medicine update.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiMedicineUpdate {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<u32>,
    pub expiry_date: Option<String>,
    pub batch_number: Option<String>,
    pub dosage_form: Option<String>,
    pub strength: Option<String>,
}

impl TryFrom<FfiMedicineUpdate> for MedicineUpdate {
    type Error = CoreError;

    fn try_from(update: FfiMedicineUpdate) -> CoreResult<Self> {
        Ok(MedicineUpdate {
            expiry_date: update
                .expiry_date
                .as_deref()
                .map(|s| parse_date("expiry_date", s))
                .transpose()?,
            name: update.name,
            brand: update.brand,
            category: update.category,
            price: update.price,
            stock: update.stock,
            batch_number: update.batch_number,
            dosage_form: update.dosage_form,
            strength: update.strength,
        })
    }
}

/// FFI-safe medicine search hit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedicineMatch {
    pub medicine: FfiMedicine,
    pub pharmacy_name: String,
    pub distance_meters: Option<f64>,
}

impl From<MedicineMatch> for FfiMedicineMatch {
    fn from(hit: MedicineMatch) -> Self {
        Self {
            medicine: hit.medicine.into(),
            pharmacy_name: hit.pharmacy_name,
            distance_meters: hit.distance_meters,
        }
    }
}

/// FFI-safe hospital search hit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiHospitalMatch {
    pub hospital: FfiAccount,
    pub distance_meters: Option<f64>,
}

impl From<HospitalMatch> for FfiHospitalMatch {
    fn from(hit: HospitalMatch) -> Self {
        Self {
            hospital: hit.hospital.into(),
            distance_meters: hit.distance_meters,
        }
    }
}

/// FFI-safe search filter.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiSearchFilter {
    pub query: Option<String>,
    pub near: Option<FfiGeoPoint>,
    pub radius_meters: Option<f64>,
    pub city: Option<String>,
    pub area: Option<String>,
    /// icu, nicu, ventilator or general
    pub bed_type: Option<String>,
}

impl TryFrom<FfiSearchFilter> for SearchFilter {
    type Error = CoreError;

    fn try_from(filter: FfiSearchFilter) -> CoreResult<Self> {
        let bed_type = filter
            .bed_type
            .as_deref()
            .map(|s| {
                BedType::parse(s)
                    .ok_or_else(|| CoreError::Validation(format!("unknown bed type: {}", s)))
            })
            .transpose()?;
        Ok(SearchFilter {
            query: filter.query,
            near: filter.near.map(GeoPoint::try_from).transpose()?,
            radius_meters: filter.radius_meters,
            city: filter.city,
            area: filter.area,
            bed_type,
        })
    }
}
