//! Shared alignment types used across core and pipelines.

/// Distance reported for a key/text pair that cannot align within budget.
pub const ALIGN_DISTANCE_INF: u64 = u64::MAX;
/// Distance not computed yet (tile still pending).
pub const ALIGN_DISTANCE_UNKNOWN: u64 = u64::MAX - 1;
/// End column reported when no alignment column exists.
pub const ALIGN_COLUMN_INF: u64 = u64::MAX;

/// Strand a candidate or trace was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Strand {
    #[default]
    Forward,
    Reverse,
}

impl Strand {
    pub fn flip(self) -> Self {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
        }
    }
}

/// One verification window over the candidate text.
///
/// `text_begin_offset..text_end_offset` is relative to the candidate text;
/// `key_begin..key_end` is the slice of the key the tile is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentTile {
    pub key_begin: usize,
    pub key_end: usize,
    pub text_begin_offset: u64,
    pub text_end_offset: u64,
    /// Exact distance, or `ALIGN_DISTANCE_INF` / `ALIGN_DISTANCE_UNKNOWN`
    pub distance: u64,
    /// End column of the best tile alignment (absolute in the candidate text)
    pub end_column: u64,
}

impl AlignmentTile {
    pub fn pending(key_begin: usize, key_end: usize, text_begin: u64, text_end: u64) -> Self {
        Self {
            key_begin,
            key_end,
            text_begin_offset: text_begin,
            text_end_offset: text_end,
            distance: ALIGN_DISTANCE_UNKNOWN,
            end_column: ALIGN_COLUMN_INF,
        }
    }

    #[inline]
    pub fn is_verified(&self) -> bool {
        self.distance != ALIGN_DISTANCE_UNKNOWN
    }
}

/// Tile decomposition of one candidate.
///
/// `distance_min_bound` is the running sum of per-tile lower bounds. It only
/// grows as tiles are verified, and saturates at `ALIGN_DISTANCE_INF` once a
/// tile proves the candidate unalignable.
#[derive(Debug, Clone, Default)]
pub struct Alignment {
    pub tiles: Vec<AlignmentTile>,
    pub distance_min_bound: u64,
}

impl Alignment {
    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Account for another tile bound; keeps the bound non-decreasing.
    pub fn add_tile_bound(&mut self, bound: u64) {
        self.distance_min_bound = if bound >= ALIGN_DISTANCE_UNKNOWN {
            ALIGN_DISTANCE_INF
        } else {
            self.distance_min_bound.saturating_add(bound)
        };
    }

    pub fn is_discarded(&self) -> bool {
        self.distance_min_bound == ALIGN_DISTANCE_INF
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
        self.distance_min_bound = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_bound_monotone() {
        let mut alignment = Alignment::default();
        alignment.add_tile_bound(1);
        alignment.add_tile_bound(0);
        assert_eq!(alignment.distance_min_bound, 1);
        alignment.add_tile_bound(2);
        assert_eq!(alignment.distance_min_bound, 3);
        alignment.add_tile_bound(ALIGN_DISTANCE_INF);
        assert!(alignment.is_discarded());
        alignment.add_tile_bound(1);
        assert!(alignment.is_discarded());
    }

    #[test]
    fn test_strand_flip() {
        assert_eq!(Strand::Forward.flip(), Strand::Reverse);
        assert_eq!(Strand::Reverse.flip().flip(), Strand::Reverse);
    }
}
