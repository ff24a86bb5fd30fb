//! Stratified match counters: a histogram of matches by edit distance.

/// `counts[d]` is the number of matches at distance `d`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchesCounters {
    counts: Vec<u64>,
    total_count: u64,
}

impl MatchesCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.total_count = 0;
    }

    pub fn add(&mut self, distance: u64, num_matches: u64) {
        let d = distance as usize;
        if self.counts.len() <= d {
            self.counts.resize(d + 1, 0);
        }
        self.counts[d] += num_matches;
        self.total_count += num_matches;
    }

    /// Remove matches from a stratum (saturates at zero)
    pub fn sub(&mut self, distance: u64, num_matches: u64) {
        if let Some(count) = self.counts.get_mut(distance as usize) {
            let removed = num_matches.min(*count);
            *count -= removed;
            self.total_count -= removed;
        }
    }

    pub fn get_count(&self, distance: u64) -> u64 {
        self.counts.get(distance as usize).copied().unwrap_or(0)
    }

    pub fn get_total_count(&self) -> u64 {
        self.total_count
    }

    /// Number of strata currently tracked (populated or not)
    pub fn num_counters(&self) -> usize {
        self.counts.len()
    }

    /// Lowest populated distance
    pub fn get_min_distance(&self) -> Option<u64> {
        self.counts.iter().position(|&c| c > 0).map(|d| d as u64)
    }

    /// Highest populated distance
    pub fn get_max_distance(&self) -> Option<u64> {
        self.counts.iter().rposition(|&c| c > 0).map(|d| d as u64)
    }

    /// Number of matches in the stratum right after the best one, i.e. the
    /// first populated stratum past the minimum
    pub fn get_subdominant(&self) -> Option<(u64, u64)> {
        let min = self.get_min_distance()? as usize;
        self.counts[min + 1..]
            .iter()
            .position(|&c| c > 0)
            .map(|off| ((min + 1 + off) as u64, self.counts[min + 1 + off]))
    }

    /// Drop empty trailing strata; returns the number of strata kept
    pub fn compact(&mut self) -> u64 {
        let keep = self.counts.iter().rposition(|&c| c > 0).map_or(0, |d| d + 1);
        self.counts.truncate(keep);
        keep as u64
    }

    /// Populated strata as `(distance, count)` in increasing distance
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(d, &c)| (d as u64, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram() {
        let mut counters = MatchesCounters::new();
        assert_eq!(counters.get_min_distance(), None);
        counters.add(2, 1);
        counters.add(5, 3);
        counters.add(2, 1);
        assert_eq!(counters.get_total_count(), 5);
        assert_eq!(counters.get_min_distance(), Some(2));
        assert_eq!(counters.get_max_distance(), Some(5));
        assert_eq!(counters.get_count(2), 2);
        assert_eq!(counters.get_subdominant(), Some((5, 3)));
        assert_eq!(counters.iter().collect::<Vec<_>>(), vec![(2, 2), (5, 3)]);
    }

    #[test]
    fn test_sub_and_compact() {
        let mut counters = MatchesCounters::new();
        counters.add(1, 1);
        counters.add(7, 2);
        counters.sub(7, 5);
        assert_eq!(counters.get_total_count(), 1);
        assert_eq!(counters.num_counters(), 8);
        assert_eq!(counters.compact(), 2);
        assert_eq!(counters.num_counters(), 2);
        assert_eq!(counters.get_max_distance(), Some(1));
        counters.sub(1, 1);
        assert_eq!(counters.compact(), 0);
    }
}
