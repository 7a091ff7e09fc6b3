use std::collections::VecDeque;

/// Fixed-capacity FIFO: pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedBuffer<T> {
    data: VecDeque<T>,
    max_length: usize,
}

impl<T> BoundedBuffer<T> {
    pub fn new(max_length: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(max_length),
            max_length,
        }
    }

    /// Returns the evicted entry, if any.
    pub fn push(&mut self, value: T) -> Option<T> {
        self.data.push_back(value);
        if self.data.len() > self.max_length {
            self.data.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.max_length
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn back(&self) -> Option<&T> {
        self.data.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.data.iter()
    }

    /// The newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.data.iter().skip(self.data.len().saturating_sub(n))
    }

    /// Oldest-first contiguous view.
    pub fn as_slice(&mut self) -> &[T] {
        self.data.make_contiguous()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl BoundedBuffer<f32> {
    pub fn get_mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}
