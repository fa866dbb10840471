use std::collections::VecDeque;

/// Fixed-capacity FIFO used to smooth per-tick signals.
///
/// Pushing onto a full history evicts the oldest sample, so `len()` never
/// exceeds `capacity()`.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingHistory<T> {
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be positive");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// The two most recent samples as `(previous, latest)`.
    pub fn last_two(&self) -> Option<(&T, &T)> {
        let n = self.items.len();
        if n < 2 {
            return None;
        }
        Some((&self.items[n - 2], &self.items[n - 1]))
    }

    /// Up to `n` most recent samples, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl RollingHistory<f64> {
    pub fn mean(&self) -> Option<f64> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.items.iter().sum::<f64>() / self.items.len() as f64)
    }

    /// Largest absolute deviation of any sample from the mean.
    pub fn max_deviation(&self) -> Option<f64> {
        let mean = self.mean()?;
        Some(
            self.items
                .iter()
                .map(|v| (v - mean).abs())
                .fold(0.0, f64::max),
        )
    }
}
