//! Queue coordinator integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use medoryx_core::config::{QueueConfig, StoreConfig};
use medoryx_core::db::{Database, DatabasePool};
use medoryx_core::models::{Account, Appointment, AppointmentStatus, BookingRequest, QueueStatus, Role};
use medoryx_core::{AppointmentLedger, CallNextOutcome, CoreError, DoctorLocks, QueueCoordinator};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn register_people(db: &Database, doctors: &[&str]) {
    for doctor in doctors {
        db.upsert_account(&Account::new(doctor.to_string(), Role::Doctor, format!("Dr. {}", doctor)))
            .unwrap();
    }
    db.upsert_account(&Account::new("pat-1".into(), Role::Patient, "Arjun".into()))
        .unwrap();
}

fn book(db: &Database, locks: &DoctorLocks, doctor: &str, minute: u32) -> Appointment {
    let config = QueueConfig {
        auto_admit_on_confirm: false,
    };
    AppointmentLedger::new(db, locks, &config)
        .book(BookingRequest {
            patient_id: "pat-1".into(),
            doctor_id: doctor.into(),
            start_time: Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0).unwrap()),
            ..Default::default()
        })
        .unwrap()
}

fn admitted(db: &Database, locks: &DoctorLocks, doctor: &str, count: u32) -> Vec<Appointment> {
    (0..count)
        .map(|i| {
            let appointment = book(db, locks, doctor, i);
            QueueCoordinator::new(db, locks)
                .admit(&appointment.id, "pat-1")
                .unwrap()
        })
        .collect()
}

fn serving_count(db: &Database, doctor: &str) -> usize {
    db.list_queue_appointments(doctor, day(), QueueStatus::Serving, None)
        .unwrap()
        .len()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_tokens_strictly_increase_per_doctor(doctors in prop::collection::vec(0usize..3, 1..20)) {
        let db = Database::open_in_memory().unwrap();
        let locks = DoctorLocks::new();
        let names = ["doc-a", "doc-b", "doc-c"];
        register_people(&db, &names);

        let mut last: HashMap<&str, u32> = HashMap::new();
        for (minute, index) in doctors.into_iter().enumerate() {
            let doctor = names[index];
            let appointment = book(&db, &locks, doctor, minute as u32 % 60);
            let token = QueueCoordinator::new(&db, &locks)
                .admit(&appointment.id, "pat-1")
                .unwrap()
                .token()
                .unwrap();
            if let Some(previous) = last.insert(doctor, token) {
                prop_assert!(token > previous);
            } else {
                prop_assert_eq!(token, 1);
            }
        }

        for doctor in names {
            let waiting = db
                .list_queue_appointments(doctor, day(), QueueStatus::Waiting, None)
                .unwrap();
            let mut tokens: Vec<u32> = waiting.iter().filter_map(|a| a.token()).collect();
            let count = tokens.len();
            tokens.dedup();
            prop_assert_eq!(tokens.len(), count);
        }
    }
}

#[test]
fn test_call_next_serves_lowest_waiting_token() {
    let db = Database::open_in_memory().unwrap();
    let locks = DoctorLocks::new();
    register_people(&db, &["doc-1"]);
    let appointments = admitted(&db, &locks, "doc-1", 7);
    let coordinator = QueueCoordinator::new(&db, &locks);

    // Leave tokens 3, 5 and 7 waiting
    for index in [0, 1, 3, 5] {
        coordinator.skip(&appointments[index].id, "doc-1").unwrap();
    }
    let queue = coordinator.live_queue("doc-1", day()).unwrap();
    let tokens: Vec<u32> = queue.waiting.iter().map(|e| e.token).collect();
    assert_eq!(tokens, vec![3, 5, 7]);
    assert!(queue.serving.is_none());
    assert_eq!(queue.position_of(&appointments[6].id), Some(3));

    let first = coordinator.call_next("doc-1", "doc-1", day(), None).unwrap();
    assert_eq!(first.now_serving().unwrap().token, 3);
    assert!(first.completed().is_none());

    let second = coordinator.call_next("doc-1", "doc-1", day(), None).unwrap();
    assert_eq!(second.now_serving().unwrap().token, 5);
    assert_eq!(second.completed().unwrap().token, 3);

    assert_eq!(
        db.get_appointment(&appointments[2].id).unwrap().unwrap().queue_status(),
        Some(QueueStatus::Completed)
    );
    assert_eq!(
        db.get_appointment(&appointments[6].id).unwrap().unwrap().queue_status(),
        Some(QueueStatus::Waiting)
    );
    assert_eq!(serving_count(&db, "doc-1"), 1);
}

#[test]
fn test_call_next_on_empty_queue_writes_nothing() {
    let db = Database::open_in_memory().unwrap();
    let locks = DoctorLocks::new();
    register_people(&db, &["doc-1"]);
    let coordinator = QueueCoordinator::new(&db, &locks);

    let outcome = coordinator.call_next("doc-1", "doc-1", day(), None).unwrap();
    assert_eq!(outcome, CallNextOutcome::NoPatientsWaiting { completed: None });
    assert!(db.get_queue_state("doc-1", day()).unwrap().is_none());

    let queue = coordinator.live_queue("doc-1", day()).unwrap();
    assert_eq!(queue.version, 0);
    assert!(queue.serving.is_none());
    assert!(queue.waiting.is_empty());
}

#[test]
fn test_last_call_next_empties_serving_slot() {
    let db = Database::open_in_memory().unwrap();
    let locks = DoctorLocks::new();
    register_people(&db, &["doc-1"]);
    admitted(&db, &locks, "doc-1", 1);
    let coordinator = QueueCoordinator::new(&db, &locks);

    coordinator.call_next("doc-1", "doc-1", day(), None).unwrap();
    let outcome = coordinator.call_next("doc-1", "doc-1", day(), None).unwrap();
    assert!(outcome.now_serving().is_none());
    assert_eq!(outcome.completed().unwrap().token, 1);
    assert_eq!(serving_count(&db, "doc-1"), 0);

    let state = db.get_queue_state("doc-1", day()).unwrap().unwrap();
    assert!(state.serving_appointment_id.is_none());
}

#[test]
fn test_only_the_doctor_advances_the_queue() {
    let db = Database::open_in_memory().unwrap();
    let locks = DoctorLocks::new();
    register_people(&db, &["doc-1"]);
    let appointments = admitted(&db, &locks, "doc-1", 1);
    let coordinator = QueueCoordinator::new(&db, &locks);

    assert!(matches!(
        coordinator.call_next("doc-1", "pat-1", day(), None),
        Err(CoreError::Unauthorized(_))
    ));
    assert!(matches!(
        coordinator.skip(&appointments[0].id, "pat-1"),
        Err(CoreError::Unauthorized(_))
    ));
    assert_eq!(
        coordinator.live_queue("doc-1", day()).unwrap().waiting.len(),
        1
    );
}

#[test]
fn test_admit_twice_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let locks = DoctorLocks::new();
    register_people(&db, &["doc-1"]);
    let appointments = admitted(&db, &locks, "doc-1", 1);

    let err = QueueCoordinator::new(&db, &locks)
        .admit(&appointments[0].id, "doc-1")
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyAdmitted(_)));
    assert_eq!(db.get_queue_state("doc-1", day()).unwrap().unwrap().next_token, 2);
}

#[test]
fn test_cancelling_serving_appointment_frees_the_slot() {
    let db = Database::open_in_memory().unwrap();
    let locks = DoctorLocks::new();
    register_people(&db, &["doc-1"]);
    let appointments = admitted(&db, &locks, "doc-1", 2);
    let coordinator = QueueCoordinator::new(&db, &locks);
    coordinator.call_next("doc-1", "doc-1", day(), None).unwrap();

    let config = QueueConfig::default();
    let ledger = AppointmentLedger::new(&db, &locks, &config);
    let cancelled = ledger
        .update_status(&appointments[0].id, "pat-1", AppointmentStatus::Cancelled)
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.queue_status(), Some(QueueStatus::Completed));

    let queue = coordinator.live_queue("doc-1", day()).unwrap();
    assert!(queue.serving.is_none());
    assert_eq!(queue.waiting.len(), 1);

    let next = coordinator.call_next("doc-1", "doc-1", day(), None).unwrap();
    assert_eq!(next.now_serving().unwrap().token, 2);
    assert!(next.completed().is_none());
}

#[test]
fn test_doctors_queues_are_independent() {
    let db = Database::open_in_memory().unwrap();
    let locks = DoctorLocks::new();
    register_people(&db, &["doc-1", "doc-2"]);
    admitted(&db, &locks, "doc-1", 2);
    let other = admitted(&db, &locks, "doc-2", 1);
    assert_eq!(other[0].token(), Some(1));

    let coordinator = QueueCoordinator::new(&db, &locks);
    coordinator.call_next("doc-1", "doc-1", day(), None).unwrap();

    let queue = coordinator.live_queue("doc-2", day()).unwrap();
    assert!(queue.serving.is_none());
    assert_eq!(queue.waiting[0].appointment_id, other[0].id);
}

fn file_pool(dir: &tempfile::TempDir) -> Arc<DatabasePool> {
    let config = StoreConfig {
        max_connections: 4,
        ..Default::default()
    };
    Arc::new(DatabasePool::open(dir.path().join("queue.db"), &config).unwrap())
}

fn race_call_next(
    pool: &Arc<DatabasePool>,
    locks: &Arc<DoctorLocks>,
    expected_version: Option<i64>,
) -> Vec<Result<CallNextOutcome, CoreError>> {
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(pool);
            let locks = Arc::clone(locks);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let db = pool.get().unwrap();
                barrier.wait();
                let coordinator = QueueCoordinator::new(&db, &locks);
                coordinator.call_next("doc-1", "doc-1", day(), expected_version)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_call_next_at_same_version_advances_once() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir);
    let locks = Arc::new(DoctorLocks::new());
    let version = {
        let db = pool.get().unwrap();
        register_people(&db, &["doc-1"]);
        admitted(&db, &locks, "doc-1", 2);
        QueueCoordinator::new(&db, &locks)
            .live_queue("doc-1", day())
            .unwrap()
            .version
    };

    let results = race_call_next(&pool, &locks, Some(version));
    let advanced: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(advanced.len(), 1);
    assert_eq!(advanced[0].now_serving().unwrap().token, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(CoreError::Conflict(_)))));

    let db = pool.get().unwrap();
    let queue = QueueCoordinator::new(&db, &locks).live_queue("doc-1", day()).unwrap();
    assert_eq!(queue.current_token(), Some(1));
    assert_eq!(queue.waiting.len(), 1);
    assert_eq!(queue.waiting[0].token, 2);
}

#[test]
fn test_concurrent_call_next_without_version_serializes() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir);
    let locks = Arc::new(DoctorLocks::new());
    let appointments = {
        let db = pool.get().unwrap();
        register_people(&db, &["doc-1"]);
        admitted(&db, &locks, "doc-1", 2)
    };

    let results = race_call_next(&pool, &locks, None);
    assert!(results.iter().all(|r| r.is_ok()));

    let db = pool.get().unwrap();
    assert_eq!(serving_count(&db, "doc-1"), 1);
    assert_eq!(
        db.get_appointment(&appointments[0].id).unwrap().unwrap().queue_status(),
        Some(QueueStatus::Completed)
    );
    assert_eq!(
        db.get_appointment(&appointments[1].id).unwrap().unwrap().queue_status(),
        Some(QueueStatus::Serving)
    );
}
