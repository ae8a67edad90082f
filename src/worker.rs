use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError};
use rand::Rng;

use crate::error::{BakeryError, Result};
use crate::lock::{BakeryLock, Participant};
use crate::shared::SharedResource;
use crate::trace::Tracer;

/// Shutdown acknowledgment sent by a worker once it has left its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    /// Completed acquire / critical section / release cycles.
    pub cycles: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Fixed extra time spent holding the lock on every cycle.
    pub hold: Duration,
    /// Upper bound of a random extra hold on every cycle.
    pub jitter: Duration,
}

impl WorkerOptions {
    fn hold_time(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.hold;
        }
        let extra = rand::thread_rng().gen_range(0..=self.jitter.as_micros() as u64);
        self.hold + Duration::from_micros(extra)
    }
}

/// Coordinator-side end of a running worker.
pub struct WorkerHandle {
    id: usize,
    stop: Sender<()>,
    ack: Receiver<WorkerReport>,
    thread: JoinHandle<Result<WorkerReport>>,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Asks the worker to stop after its current cycle. Never blocks.
    pub fn stop(&self) {
        // Full means a stop is already pending; disconnected means it exited.
        let _ = self.stop.try_send(());
    }

    /// Waits for the shutdown acknowledgment, then joins the thread.
    pub fn wait(self) -> Result<WorkerReport> {
        let acked = self.ack.recv();
        let joined = self
            .thread
            .join()
            .map_err(|_| BakeryError::WorkerPanicked { id: self.id })?;
        match acked {
            Ok(report) => Ok(report),
            // The worker returned without acknowledging, so it failed.
            Err(_) => joined,
        }
    }
}

/// Starts the worker owning `me` on its own named thread.
pub fn spawn(
    mut me: Participant,
    lock: Arc<BakeryLock<SharedResource>>,
    options: WorkerOptions,
    tracer: Tracer,
) -> Result<WorkerHandle> {
    let id = me.id();
    let (stop_tx, stop_rx) = bounded(1);
    let (ack_tx, ack_rx) = bounded(1);

    let thread = thread::Builder::new()
        .name(format!("bakery-worker-{id}"))
        .spawn(move || run(&mut me, &lock, &stop_rx, &ack_tx, options, &tracer))
        .map_err(|source| BakeryError::Spawn { id, source })?;

    Ok(WorkerHandle {
        id,
        stop: stop_tx,
        ack: ack_rx,
        thread,
    })
}

/// The worker loop. The stop signal is only polled between cycles, so a
/// worker never leaves while holding a ticket.
pub fn run(
    me: &mut Participant,
    lock: &BakeryLock<SharedResource>,
    stop: &Receiver<()>,
    ack: &Sender<WorkerReport>,
    options: WorkerOptions,
    tracer: &Tracer,
) -> Result<WorkerReport> {
    let mut cycles = 0;
    loop {
        match stop.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }
        cycle(me, lock, options, tracer)?;
        cycles += 1;
    }

    let report = WorkerReport { id: me.id(), cycles };
    // The coordinator may already be gone after a fatal error.
    let _ = ack.send(report.clone());
    Ok(report)
}

fn cycle(
    me: &mut Participant,
    lock: &BakeryLock<SharedResource>,
    options: WorkerOptions,
    tracer: &Tracer,
) -> Result<()> {
    let id = me.id();
    let mut shared = lock.lock(me)?;
    tracer.progress(|| format!("{id}: entering critical section"));

    shared.record(id);
    let hold = options.hold_time();
    if !hold.is_zero() {
        thread::sleep(hold);
    }

    tracer.progress(|| format!("{id}: done critical section"));
    Ok(())
}
