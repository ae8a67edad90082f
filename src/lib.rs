//! # Bakery
//!
//! Lamport's bakery lock plus the harness that stress-tests it.
//!
//! N workers and one monitor share a [`BakeryLock`]. Workers mutate a
//! [`SharedResource`] inside their critical section; the monitor takes the
//! same lock and checks that no two workers were ever inside together.
//!
//! ```no_run
//! use bakery::{Coordinator, RunConfig};
//!
//! let config = RunConfig { nodes: 2, iters: 50, ..RunConfig::default() };
//! let summary = Coordinator::new(config).run()?;
//! println!("{} worker cycles", summary.total_cycles());
//! # Ok::<(), bakery::BakeryError>(())
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod monitor;
pub mod shared;
pub mod ticket;
pub mod trace;
pub mod worker;

pub use config::{parse_args, ConfigError, Invocation, RunConfig};
pub use coordinator::{Coordinator, RunSummary};
pub use error::{BakeryError, Result};
pub use lock::{BakeryGuard, BakeryLock, Participant};
pub use monitor::{Monitor, MonitorReport};
pub use shared::SharedResource;
pub use ticket::TicketState;
pub use trace::{Sink, Tracer};
pub use worker::{WorkerOptions, WorkerReport};
