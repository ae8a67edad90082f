use crate::error::{BakeryError, Result};

/// Application state touched only inside the critical section.
///
/// Every worker pushes its id onto `window` and immediately drops the oldest
/// entry, so a correctly excluded run never leaves more than one entry
/// behind. Two workers inside at once can leave two.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedResource {
    last_updated_by: Option<usize>,
    window: Vec<usize>,
}

impl SharedResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The worker-side mutation.
    pub fn record(&mut self, id: usize) {
        self.last_updated_by = Some(id);
        self.window.push(id);
        self.window.remove(0);
    }

    /// The monitor-side check.
    pub fn check_exclusive(&self) -> Result<()> {
        if self.window.len() > 1 {
            return Err(BakeryError::invariant_violation(&self.window, self.last_updated_by));
        }
        Ok(())
    }

    pub fn last_updated_by(&self) -> Option<usize> {
        self.last_updated_by
    }

    pub fn window(&self) -> &[usize] {
        &self.window
    }

    #[cfg(test)]
    pub(crate) fn with_window(window: Vec<usize>, last_updated_by: Option<usize>) -> Self {
        Self {
            last_updated_by,
            window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_window_short() {
        let mut shared = SharedResource::new();
        assert_eq!(shared.last_updated_by(), None);
        for id in [0, 3, 1] {
            shared.record(id);
            assert!(shared.window().is_empty());
            assert!(shared.check_exclusive().is_ok());
        }
        assert_eq!(shared.last_updated_by(), Some(1));
    }

    #[test]
    fn test_interleaved_writers_are_caught() {
        // Two writers that each pushed before either trimmed.
        let shared = SharedResource::with_window(vec![0, 1], Some(1));

        let err = shared.check_exclusive().unwrap_err();
        assert!(matches!(
            err,
            BakeryError::InvariantViolation { ref window, last_updated_by: Some(1) } if window == &vec![0, 1]
        ));
    }
}
