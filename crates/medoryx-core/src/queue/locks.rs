//! Per-doctor mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::CoreResult;

/// Registry entries kept before idle ones are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// One lock per doctor, created on first use.
///
/// Queue mutations for the same doctor run one at a time; different doctors
/// never wait on each other. The registry mutex is only held while looking up
/// a doctor's lock, never while that lock is held.
#[derive(Debug, Default)]
pub struct DoctorLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DoctorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `doctor_id`.
    pub fn with_doctor<T>(
        &self,
        doctor_id: &str,
        f: impl FnOnce() -> CoreResult<T>,
    ) -> CoreResult<T> {
        let lock = self.lock_for(doctor_id)?;
        let _guard = lock.lock()?;
        f()
    }

    fn lock_for(&self, doctor_id: &str) -> CoreResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock()?;
        if let Some(lock) = locks.get(doctor_id) {
            return Ok(Arc::clone(lock));
        }

        if locks.len() >= PRUNE_THRESHOLD {
            // Only the registry holds a reference to idle locks
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(doctor_id.to_string(), Arc::clone(&lock));
        Ok(lock)
    }

    /// Doctors with a lock in the registry.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_doctor_is_serialized() {
        let locks = Arc::new(DoctorLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    locks
                        .with_doctor("doc-1", || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(5));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_doctors_do_not_block() {
        let locks = DoctorLocks::new();
        let result = locks.with_doctor("doc-1", || {
            // Would deadlock if doctors shared a lock
            locks.with_doctor("doc-2", || Ok(42))
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_errors_pass_through() {
        let locks = DoctorLocks::new();
        let result: CoreResult<()> = locks.with_doctor("doc-1", || {
            Err(crate::error::CoreError::Conflict("moved".into()))
        });
        assert!(result.unwrap_err().is_conflict());
    }
}
