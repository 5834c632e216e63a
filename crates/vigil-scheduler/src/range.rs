use serde::{Deserialize, Serialize};

/// Inclusive stepped interval used inside a rule field.
///
/// `Range::new(1, 5, 2)` contains 1, 3 and 5. A zero step or `start > end`
/// makes the range empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: u32,
    pub end: u32,
    #[serde(default = "default_step")]
    pub step: u32,
}

fn default_step() -> u32 {
    1
}

impl Default for Range {
    fn default() -> Self {
        Self {
            start: 0,
            end: 60,
            step: 1,
        }
    }
}

impl Range {
    pub fn new(start: u32, end: u32, step: u32) -> Self {
        Self { start, end, step }
    }

    /// Every value from `start` to `end`.
    pub fn inclusive(start: u32, end: u32) -> Self {
        Self::new(start, end, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.step == 0 || self.start > self.end
    }

    pub fn contains(&self, value: u32) -> bool {
        if self.is_empty() || value < self.start || value > self.end {
            return false;
        }
        (value - self.start) % self.step == 0
    }

    /// Values in ascending order.
    pub fn values(&self) -> impl Iterator<Item = u32> {
        let step = self.step.max(1) as usize;
        let (start, end) = if self.is_empty() {
            (1, 0)
        } else {
            (self.start, self.end)
        };
        (start..=end).step_by(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_covers_zero_to_sixty() {
        let r = Range::default();
        assert!(r.contains(0));
        assert!(r.contains(59));
        assert!(r.contains(60));
        assert!(!r.contains(61));
    }

    #[test]
    fn stepped_range() {
        let r = Range::new(1, 5, 2);
        assert!(r.contains(1));
        assert!(!r.contains(2));
        assert!(r.contains(3));
        assert!(r.contains(5));
        assert!(!r.contains(7));
        assert_eq!(r.values().collect::<Vec<_>>(), vec![1, 3, 5]);
    }

    #[test]
    fn step_that_skips_the_end() {
        let r = Range::new(0, 10, 3);
        assert!(r.contains(9));
        assert!(!r.contains(10));
    }

    #[test]
    fn empty_ranges_contain_nothing() {
        for r in [Range::new(5, 1, 1), Range::new(0, 10, 0)] {
            assert!(r.is_empty());
            assert!(!r.contains(0));
            assert!(!r.contains(5));
            assert_eq!(r.values().count(), 0);
        }
    }

    #[test]
    fn below_start_is_excluded() {
        assert!(!Range::inclusive(3, 9).contains(2));
    }
}
