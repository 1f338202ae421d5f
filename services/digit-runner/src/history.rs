//! Rolling digit history per symbol

use serde::Serialize;
use std::collections::VecDeque;

/// Fixed-capacity FIFO of recent digits, oldest first
#[derive(Debug, Clone, Serialize)]
pub struct DigitHistory {
    digits: VecDeque<u8>,
    capacity: usize,
}

impl DigitHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            digits: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a digit, evicting the oldest when full
    pub fn push(&mut self, digit: u8) {
        debug_assert!(digit <= 9, "digit out of range: {}", digit);
        if self.digits.len() == self.capacity {
            self.digits.pop_front();
        }
        self.digits.push_back(digit);
    }

    /// Up to `k` most recent digits, most recent last
    pub fn last(&self, k: usize) -> Vec<u8> {
        let skip = self.digits.len().saturating_sub(k);
        self.digits.iter().skip(skip).copied().collect()
    }

    /// Most recent digit
    pub fn latest(&self) -> Option<u8> {
        self.digits.back().copied()
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occurrence count of each digit in the window
    pub fn frequencies(&self) -> [usize; 10] {
        let mut counts = [0usize; 10];
        for &d in &self.digits {
            counts[d as usize] += 1;
        }
        counts
    }

    /// Most and least frequent digits as `(highest, lowest)`.
    ///
    /// Ties go to the lower digit. Digits that never appeared count as zero.
    pub fn extremes(&self) -> Option<(u8, u8)> {
        if self.digits.is_empty() {
            return None;
        }

        let counts = self.frequencies();
        let mut highest = 0usize;
        let mut lowest = 0usize;
        for digit in 1..10 {
            if counts[digit] > counts[highest] {
                highest = digit;
            }
            if counts[digit] < counts[lowest] {
                lowest = digit;
            }
        }
        Some((highest as u8, lowest as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_eviction() {
        let mut history = DigitHistory::new(3);
        for d in [1, 2, 3, 4] {
            history.push(d);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.last(3), vec![2, 3, 4]);
        assert_eq!(history.latest(), Some(4));
    }

    #[test]
    fn test_last_without_padding() {
        let mut history = DigitHistory::new(10);
        history.push(7);
        history.push(8);
        assert_eq!(history.last(5), vec![7, 8]);
        assert_eq!(history.last(1), vec![8]);
        assert!(history.last(0).is_empty());
    }

    #[test]
    fn test_frequencies_and_extremes() {
        let mut history = DigitHistory::new(20);
        assert_eq!(history.extremes(), None);

        for d in [3, 3, 3, 1, 1, 0, 2, 4, 5, 6, 7, 8, 9] {
            history.push(d);
        }
        let counts = history.frequencies();
        assert_eq!(counts[3], 3);
        assert_eq!(counts[1], 2);
        assert_eq!(history.extremes(), Some((3, 0)));
    }

    #[test]
    fn test_extremes_tie_breaks_low() {
        let mut history = DigitHistory::new(10);
        for d in [5, 7] {
            history.push(d);
        }
        // 5 and 7 tie for highest; every absent digit ties for lowest
        assert_eq!(history.extremes(), Some((5, 0)));
    }
}
