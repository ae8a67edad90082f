use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{BakeryError, Result};

/// The per-participant `choosing` and `number` slots.
///
/// Participant `i` only ever writes slot `i` and reads every slot, so no slot
/// has two writers. The slots are atomics purely to make those plain reads and
/// writes well defined across threads: only `load` and `store` are used, never
/// a read-modify-write. Every access is `SeqCst` because the algorithm assumes
/// sequentially consistent memory; weaker orderings let two participants both
/// miss each other's doorway.
#[derive(Debug)]
pub struct TicketState {
    choosing: Box<[AtomicBool]>,
    number: Box<[AtomicU64]>,
}

impl TicketState {
    pub fn new(participants: usize) -> Result<Self> {
        if participants == 0 {
            return Err(BakeryError::EmptyParticipantSet);
        }
        Ok(Self {
            choosing: (0..participants).map(|_| AtomicBool::new(false)).collect(),
            number: (0..participants).map(|_| AtomicU64::new(0)).collect(),
        })
    }

    pub fn participants(&self) -> usize {
        self.number.len()
    }

    pub fn is_choosing(&self, id: usize) -> bool {
        self.choosing[id].load(Ordering::SeqCst)
    }

    pub fn number(&self, id: usize) -> u64 {
        self.number[id].load(Ordering::SeqCst)
    }

    /// Only participant `id` may call this for slot `id`.
    pub(crate) fn set_choosing(&self, id: usize, value: bool) {
        self.choosing[id].store(value, Ordering::SeqCst);
    }

    /// Only participant `id` may call this for slot `id`.
    pub(crate) fn set_number(&self, id: usize, value: u64) {
        self.number[id].store(value, Ordering::SeqCst);
    }

    /// Largest ticket currently visible. Slots are read one at a time, so the
    /// result may be stale by the time it returns; the doorway tolerates that.
    pub fn max_number(&self) -> Result<u64> {
        self.number
            .iter()
            .map(|slot| slot.load(Ordering::SeqCst))
            .max()
            .ok_or(BakeryError::EmptyParticipantSet)
    }

    pub fn choosing_snapshot(&self) -> Vec<bool> {
        self.choosing.iter().map(|slot| slot.load(Ordering::SeqCst)).collect()
    }

    pub fn numbers_snapshot(&self) -> Vec<u64> {
        self.number.iter().map(|slot| slot.load(Ordering::SeqCst)).collect()
    }

    /// True when nobody is in a doorway and nobody holds a ticket.
    pub fn is_idle(&self) -> bool {
        self.choosing_snapshot().iter().all(|c| !c) && self.numbers_snapshot().iter().all(|&n| n == 0)
    }
}
