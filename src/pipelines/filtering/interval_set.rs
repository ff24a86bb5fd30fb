//! SA interval sets handed over by the index search.

/// One suffix-array interval `[lo, hi)` of text positions matching a region
/// of the read with `distance` errors over `length` bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaInterval {
    pub lo: u64,
    pub hi: u64,
    pub distance: u64,
    pub length: u64,
}

impl SaInterval {
    pub fn count(&self) -> u64 {
        self.hi.saturating_sub(self.lo)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    intervals: Vec<SaInterval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, lo: u64, hi: u64, distance: u64, length: u64) {
        if hi > lo {
            self.intervals.push(SaInterval {
                lo,
                hi,
                distance,
                length,
            });
        }
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Positions covered by all intervals
    pub fn count_elements(&self) -> u64 {
        self.intervals.iter().map(SaInterval::count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SaInterval> {
        self.intervals.iter()
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a SaInterval;
    type IntoIter = std::slice::Iter<'a, SaInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
