use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RunConfig;
use crate::error::{BakeryError, Result};
use crate::lock::{BakeryLock, Participant};
use crate::monitor::{Monitor, MonitorReport};
use crate::shared::SharedResource;
use crate::trace::Tracer;
use crate::worker::{self, WorkerHandle, WorkerOptions, WorkerReport};

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub monitor: MonitorReport,
    pub workers: Vec<WorkerReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total_cycles(&self) -> u64 {
        self.workers.iter().map(|w| w.cycles).sum()
    }

    /// Workers that never got into their critical section.
    pub fn starved(&self) -> Vec<usize> {
        self.workers.iter().filter(|w| w.cycles == 0).map(|w| w.id).collect()
    }
}

/// Owns one run: spawns the workers, runs the monitor inline and shuts
/// everything down again.
pub struct Coordinator {
    config: RunConfig,
    tracer: Tracer,
}

impl Coordinator {
    pub fn new(config: RunConfig) -> Self {
        let tracer = Tracer::stdout(config.debug, !config.quiet);
        Self { config, tracer }
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let started = Instant::now();
        let config = &self.config;

        self.tracer.notice(format!(
            "bakery: {} workers + 1 monitor, {} monitor iterations, {} cpus",
            config.nodes,
            config.iters,
            num_cpus::get()
        ));

        let mut lock = BakeryLock::new(config.participants(), SharedResource::new())?
            .with_yield_interval(config.yield_interval())
            .with_tracer(self.tracer.clone());
        // The monitor takes the last slot, the workers the rest.
        let mut participants = lock.take_participants();
        let mut monitor = participants
            .pop()
            .map(|p| Monitor::new(p, config.iters))
            .ok_or(BakeryError::EmptyParticipantSet)?;
        debug_assert_eq!(monitor.id(), config.monitor_id());
        let lock = Arc::new(lock);

        let workers = self.spawn_workers(&lock, participants)?;

        let report = match monitor.run(&lock, &self.tracer) {
            Ok(report) => report,
            Err(err) => {
                // Fatal: tell everyone to stop but do not wait on a broken lock.
                workers.iter().for_each(WorkerHandle::stop);
                return Err(err);
            }
        };

        for handle in &workers {
            self.tracer.notice("stopping");
            handle.stop();
        }

        Ok(RunSummary {
            monitor: report,
            workers: await_all(workers)?,
            elapsed: started.elapsed(),
        })
    }

    fn spawn_workers(
        &self,
        lock: &Arc<BakeryLock<SharedResource>>,
        participants: Vec<Participant>,
    ) -> Result<Vec<WorkerHandle>> {
        let mut workers = Vec::with_capacity(participants.len());
        for participant in participants {
            let options = WorkerOptions {
                hold: self.config.hold_for(participant.id()),
                jitter: self.config.jitter(),
            };
            match worker::spawn(participant, Arc::clone(lock), options, self.tracer.clone()) {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    workers.iter().for_each(WorkerHandle::stop);
                    return Err(err);
                }
            }
        }
        Ok(workers)
    }
}

/// Waits on every worker, even after one has failed, and returns the first
/// failure only once all of them are gone.
fn await_all(workers: Vec<WorkerHandle>) -> Result<Vec<WorkerReport>> {
    let mut reports = Vec::with_capacity(workers.len());
    let mut first_err = None;
    for handle in workers {
        match handle.wait() {
            Ok(report) => reports.push(report),
            Err(err) => {
                first_err.get_or_insert(err);
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(reports),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    fn config(nodes: usize, iters: usize) -> RunConfig {
        RunConfig {
            nodes,
            iters,
            quiet: true,
            yield_us: 50,
            ..RunConfig::default()
        }
    }

    fn run_silent(config: RunConfig) -> RunSummary {
        Coordinator::new(config)
            .with_tracer(Tracer::silent())
            .run()
            .unwrap()
    }

    #[test]
    fn test_two_workers_fifty_iterations() {
        let summary = run_silent(config(2, 50));
        assert_eq!(summary.monitor.iterations, 50);
        assert!(summary.monitor.max_window <= 1);
        assert_eq!(summary.workers.len(), 2);
        assert_eq!(
            summary.workers.iter().map(|w| w.id).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_single_worker() {
        let summary = run_silent(config(1, 100));
        assert_eq!(summary.monitor.iterations, 100);
        assert_eq!(summary.workers.len(), 1);
    }

    #[test]
    fn test_slow_worker_does_not_starve_others() {
        let mut config = config(10, 1000);
        config.slow_worker = Some(3);
        config.slow_hold_ms = 2;

        let summary = run_silent(config);
        assert_eq!(summary.monitor.iterations, 1000);
        assert!(summary.starved().is_empty(), "starved workers: {:?}", summary.starved());
        assert!(summary.workers.iter().all(|w| w.cycles >= 1));
        assert!(summary.total_cycles() >= 10);
    }

    #[test]
    fn test_jitter_keeps_exclusion() {
        let mut config = config(4, 200);
        config.jitter_us = 100;
        let summary = run_silent(config);
        assert!(summary.monitor.max_window <= 1);
    }

    #[test]
    fn test_progress_and_shutdown_lines() {
        let mut config = config(2, 20);
        config.quiet = false;
        let (tracer, lines) = Tracer::capture(false);
        let summary = Coordinator::new(config).with_tracer(tracer).run().unwrap();

        let lines = lines.lock().unwrap();
        assert!(lines[0].starts_with("bakery: 2 workers + 1 monitor, 20 monitor iterations"));
        assert_eq!(lines.iter().filter(|l| *l == "stopping").count(), 2);
        for report in &summary.workers {
            let entered = format!("{}: entering critical section", report.id);
            let done = format!("{}: done critical section", report.id);
            let entries = lines.iter().filter(|l| **l == entered).count() as u64;
            let exits = lines.iter().filter(|l| **l == done).count() as u64;
            assert_eq!(entries, report.cycles);
            assert_eq!(exits, report.cycles);
        }
    }

    #[test]
    fn test_invalid_config_is_rejected_before_spawning() {
        let err = Coordinator::new(config(0, 10))
            .with_tracer(Tracer::silent())
            .run()
            .unwrap_err();
        assert!(matches!(err, BakeryError::Config(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_await_all_drains_every_worker_before_failing() {
        let mut lock = BakeryLock::new(2, SharedResource::new())
            .unwrap()
            .with_yield_interval(Duration::from_micros(50));
        let mut ids = lock.take_participants();
        let lock = Arc::new(lock);
        let mut other = BakeryLock::new(2, SharedResource::new()).unwrap();
        let stranger = other.take_participants().remove(1);

        let failing = worker::spawn(stranger, Arc::clone(&lock), WorkerOptions::default(), Tracer::silent()).unwrap();
        let healthy = worker::spawn(ids.remove(0), Arc::clone(&lock), WorkerOptions::default(), Tracer::silent()).unwrap();
        healthy.stop();

        let err = await_all(vec![failing, healthy]).unwrap_err();
        assert!(matches!(err, BakeryError::ForeignParticipant { id: 1 }));
        // Both threads were joined, so their clones of the lock are gone.
        assert_eq!(Arc::strong_count(&lock), 1);
        assert!(lock.tickets().is_idle());
    }
}
