//! Lamport's bakery lock.
//!
//! `acquire` runs in two phases. In the doorway a participant raises its
//! `choosing` flag, takes `1 + max(number)` as its ticket and lowers the flag.
//! In the bakery it walks every slot, first waiting for that participant to
//! leave its doorway, then waiting while it holds a smaller `(ticket, index)`
//! pair. `release` clears the ticket and nothing else.
//!
//! Wait loops sleep between checks instead of spinning. A tight spin keeps the
//! first few threads on the available cores and starves everyone else.
//!
//! Each slot is owned by exactly one [`Participant`] token, handed out once by
//! [`BakeryLock::take_participants`]. The lock methods borrow the token
//! mutably, so one slot can never be in two places at once.
//!
//! ```
//! use bakery::BakeryLock;
//!
//! let mut lock = BakeryLock::new(2, Vec::new())?;
//! let mut ids = lock.take_participants();
//! {
//!     let mut guard = lock.lock(&mut ids[1])?;
//!     guard.push("one");
//! }
//! assert_eq!(*lock.lock(&mut ids[0])?, vec!["one"]);
//! # Ok::<(), bakery::BakeryError>(())
//! ```

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{BakeryError, Result};
use crate::ticket::TicketState;
use crate::trace::Tracer;

pub const DEFAULT_YIELD_INTERVAL: Duration = Duration::from_millis(10);

// Ties tokens to the lock that issued them.
static NEXT_LOCK_KEY: AtomicU64 = AtomicU64::new(1);

/// True while `other` must go first: it holds a ticket and its
/// `(ticket, index)` pair is strictly smaller than ours.
pub fn waits_for(mine: (u64, usize), other: (u64, usize)) -> bool {
    other.0 != 0 && other < mine
}

/// The right to use one slot of one lock.
///
/// Not `Clone`: a slot has exactly one owner.
///
/// ```compile_fail
/// let mut lock = bakery::BakeryLock::new(2, 0u32).unwrap();
/// let ids = lock.take_participants();
/// let twin = ids[0].clone();
/// ```
///
/// A slot cannot be released while its guard is alive:
///
/// ```compile_fail
/// let mut lock = bakery::BakeryLock::new(2, 0u32).unwrap();
/// let mut ids = lock.take_participants();
/// let guard = lock.lock(&mut ids[0]).unwrap();
/// lock.release(&mut ids[0]).unwrap();
/// drop(guard);
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct Participant {
    id: usize,
    key: u64,
}

impl Participant {
    pub fn id(&self) -> usize {
        self.id
    }
}

pub struct BakeryLock<T> {
    key: u64,
    handed_out: bool,
    tickets: TicketState,
    yield_interval: Duration,
    tracer: Tracer,
    data: UnsafeCell<T>,
}

// SAFETY: `data` is only reachable through a `BakeryGuard`. A guard needs the
// slot's unique `Participant`, and the bakery protocol admits one slot at a time.
unsafe impl<T: Send> Send for BakeryLock<T> {}
unsafe impl<T: Send> Sync for BakeryLock<T> {}

impl<T> BakeryLock<T> {
    pub fn new(participants: usize, data: T) -> Result<Self> {
        Ok(Self {
            key: NEXT_LOCK_KEY.fetch_add(1, Ordering::Relaxed),
            handed_out: false,
            tickets: TicketState::new(participants)?,
            yield_interval: DEFAULT_YIELD_INTERVAL,
            tracer: Tracer::silent(),
            data: UnsafeCell::new(data),
        })
    }

    pub fn with_yield_interval(mut self, interval: Duration) -> Self {
        self.yield_interval = interval;
        self
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// One token per slot, in index order. Only the first call returns any.
    pub fn take_participants(&mut self) -> Vec<Participant> {
        if self.handed_out {
            return Vec::new();
        }
        self.handed_out = true;
        (0..self.participants())
            .map(|id| Participant { id, key: self.key })
            .collect()
    }

    pub fn participants(&self) -> usize {
        self.tickets.participants()
    }

    pub fn tickets(&self) -> &TicketState {
        &self.tickets
    }

    /// Blocks until `me` may enter its critical section.
    ///
    /// Must be paired with [`release`](Self::release). Prefer
    /// [`lock`](Self::lock), which also grants access to the data.
    pub fn acquire(&self, me: &mut Participant) -> Result<()> {
        self.check_owner(me)?;
        let ticket = self.doorway(me.id)?;
        self.bakery(me.id, ticket);
        Ok(())
    }

    /// Gives up `me`'s ticket.
    pub fn release(&self, me: &mut Participant) -> Result<()> {
        self.check_owner(me)?;
        self.clear_ticket(me.id);
        Ok(())
    }

    /// Acquires and returns a guard that releases on drop.
    pub fn lock<'a>(&'a self, me: &'a mut Participant) -> Result<BakeryGuard<'a, T>> {
        self.acquire(me)?;
        Ok(BakeryGuard {
            lock: self,
            participant: me,
            _not_send: PhantomData,
        })
    }

    fn check_owner(&self, me: &Participant) -> Result<()> {
        if me.key == self.key {
            Ok(())
        } else {
            Err(BakeryError::ForeignParticipant { id: me.id })
        }
    }

    fn doorway(&self, id: usize) -> Result<u64> {
        self.tickets.set_choosing(id, true);
        self.tracer.debug(|| format!("{id}: choosing"));

        let ticket = match self.tickets.max_number().and_then(|max| {
            max.checked_add(1)
                .ok_or(BakeryError::TicketOverflow { id, max })
        }) {
            Ok(ticket) => ticket,
            Err(err) => {
                self.tickets.set_choosing(id, false);
                return Err(err);
            }
        };
        self.tickets.set_number(id, ticket);
        self.tracer.debug(|| format!("{id}: chose number {ticket}"));

        self.tickets.set_choosing(id, false);
        Ok(ticket)
    }

    fn bakery(&self, id: usize, ticket: u64) {
        for other in 0..self.participants() {
            if other == id {
                continue;
            }

            self.wait_while(
                || self.tickets.is_choosing(other),
                || {
                    format!(
                        "{id}: spinning for {other} (waiting for it to choose: {:?})",
                        self.tickets.choosing_snapshot()
                    )
                },
            );

            self.wait_while(
                || waits_for((ticket, id), (self.tickets.number(other), other)),
                || {
                    format!(
                        "{id}: spinning for {other} (waiting for it to finish CS: {:?})",
                        self.tickets.numbers_snapshot()
                    )
                },
            );
        }
    }

    /// Re-checks `blocked` until it clears, yielding between checks. The
    /// trace line is printed once per wait, not once per retry.
    fn wait_while(&self, mut blocked: impl FnMut() -> bool, reason: impl FnOnce() -> String) {
        let mut reason = Some(reason);
        while blocked() {
            if let Some(reason) = reason.take() {
                self.tracer.debug(reason);
            }
            if self.yield_interval.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(self.yield_interval);
            }
        }
    }

    fn clear_ticket(&self, id: usize) {
        self.tracer
            .debug(|| format!("{id}: unlock: {:?}", self.tickets.numbers_snapshot()));
        self.tickets.set_number(id, 0);
    }
}

/// Proof that a participant is inside its critical section.
///
/// Shared across threads only when `T` itself is `Sync`:
///
/// ```compile_fail
/// fn assert_sync<T: Sync>() {}
/// assert_sync::<bakery::BakeryGuard<'static, std::cell::Cell<u32>>>();
/// ```
pub struct BakeryGuard<'a, T> {
    lock: &'a BakeryLock<T>,
    participant: &'a mut Participant,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: a `&BakeryGuard` only hands out `&T`.
unsafe impl<T: Sync> Sync for BakeryGuard<'_, T> {}

impl<T> BakeryGuard<'_, T> {
    pub fn id(&self) -> usize {
        self.participant.id
    }
}

impl<T> Deref for BakeryGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard's participant won the bakery, so no other guard
        // exists until it is dropped.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for BakeryGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in `deref`, and `&mut self` rules out other borrows
        // through this guard.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for BakeryGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.clear_ticket(self.participant.id);
    }
}
