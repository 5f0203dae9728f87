use std::collections::VecDeque;

/// Count-bounded trailing window. Oldest samples are evicted first.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    window: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(item);
    }

    pub fn latest(&self) -> Option<&T> {
        self.window.back()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

impl RollingWindow<f64> {
    pub fn mean(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }
}
