use std::sync::atomic::{AtomicUsize, Ordering};

/// Explicit huge pages still available to this process.
///
/// Filled once by the enablement check and only drawn down afterwards.
#[derive(Debug, Default)]
pub struct HugePageBudget {
    available: AtomicUsize,
}

impl HugePageBudget {
    pub fn new(available: usize) -> Self {
        Self {
            available: AtomicUsize::new(available),
        }
    }

    pub fn available(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self, available: usize) {
        self.available.store(available, Ordering::Release);
    }

    /// Takes `pages` from the budget if that many remain. On shortfall the
    /// budget is left untouched and the amount available is returned.
    pub fn try_reserve(&self, pages: usize) -> Result<(), usize> {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |avail| {
                avail.checked_sub(pages)
            })
            .map(|_| ())
    }
}
