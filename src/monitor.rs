use std::collections::BTreeSet;

use crate::error::Result;
use crate::lock::{BakeryLock, Participant};
use crate::shared::SharedResource;
use crate::trace::Tracer;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub iterations: usize,
    /// Longest window ever observed while holding the lock.
    pub max_window: usize,
    /// Workers seen as the last writer at some monitor visit.
    pub writers_seen: BTreeSet<usize>,
}

/// An extra participant that takes the same lock as the workers and checks,
/// every time it holds it, that no two workers were inside together.
#[derive(Debug)]
pub struct Monitor {
    participant: Participant,
    iterations: usize,
}

impl Monitor {
    pub fn new(participant: Participant, iterations: usize) -> Self {
        Self {
            participant,
            iterations,
        }
    }

    pub fn id(&self) -> usize {
        self.participant.id()
    }

    /// Runs the full iteration budget, or stops at the first violation.
    pub fn run(&mut self, lock: &BakeryLock<SharedResource>, tracer: &Tracer) -> Result<MonitorReport> {
        let mut report = MonitorReport::default();
        for _ in 0..self.iterations {
            self.inspect(lock, tracer, &mut report)?;
            report.iterations += 1;
        }
        Ok(report)
    }

    fn inspect(
        &mut self,
        lock: &BakeryLock<SharedResource>,
        tracer: &Tracer,
        report: &mut MonitorReport,
    ) -> Result<()> {
        let id = self.participant.id();
        let shared = lock.lock(&mut self.participant)?;
        tracer.debug(|| format!("{id}: monitor lock acquired, window {:?}", shared.window()));

        report.max_window = report.max_window.max(shared.window().len());
        if let Some(writer) = shared.last_updated_by() {
            report.writers_seen.insert(writer);
        }
        shared.check_exclusive()?;

        drop(shared);
        tracer.debug(|| format!("{id}: monitor lock released"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BakeryError;

    /// A three-slot lock plus a monitor holding the last slot.
    fn lock_with(shared: SharedResource, iterations: usize) -> (BakeryLock<SharedResource>, Monitor) {
        let mut lock = BakeryLock::new(3, shared).unwrap();
        let monitor = lock.take_participants().pop().map(|p| Monitor::new(p, iterations)).unwrap();
        (lock, monitor)
    }

    #[test]
    fn test_runs_exact_budget() {
        let (lock, mut monitor) = lock_with(SharedResource::new(), 25);
        assert_eq!(monitor.id(), 2);
        let report = monitor.run(&lock, &Tracer::silent()).unwrap();
        assert_eq!(report.iterations, 25);
        assert_eq!(report.max_window, 0);
        assert!(report.writers_seen.is_empty());
        assert!(lock.tickets().is_idle());
    }

    #[test]
    fn test_records_last_writer() {
        let mut shared = SharedResource::new();
        shared.record(1);
        let (lock, mut monitor) = lock_with(shared, 3);
        let report = monitor.run(&lock, &Tracer::silent()).unwrap();
        assert_eq!(report.writers_seen.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_violation_is_fatal_and_releases() {
        let (broken, mut monitor) = lock_with(SharedResource::with_window(vec![0, 1], Some(1)), 10);
        let err = monitor.run(&broken, &Tracer::silent()).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(err.to_string(), "found concurrent access with [0, 1] (last updated by Some(1))");
        assert!(broken.tickets().is_idle());
    }

    #[test]
    fn test_debug_trace_is_emitted() {
        let (lock, mut monitor) = lock_with(SharedResource::new(), 1);
        let (tracer, lines) = Tracer::capture(true);
        monitor.run(&lock, &tracer).unwrap();

        let lines = lines.lock().unwrap();
        assert!(lines.contains(&"2: monitor lock acquired, window []".to_string()));
        assert!(lines.contains(&"2: monitor lock released".to_string()));
    }

    #[test]
    fn test_monitor_from_another_lock_is_rejected() {
        let (lock, _) = lock_with(SharedResource::new(), 1);
        let (_other, mut stranger) = lock_with(SharedResource::new(), 1);
        assert!(matches!(
            stranger.run(&lock, &Tracer::silent()),
            Err(BakeryError::ForeignParticipant { id: 2 })
        ));
        assert!(lock.tickets().is_idle());
    }
}
