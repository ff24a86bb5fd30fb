//! Tiled Levenshtein verification.
//!
//! A key is cut into fixed-length tiles and each tile is verified against its
//! own window of the candidate text, first with the k-mer counting bound and
//! then with BPM. The per-tile distances add up to `distance_min_bound`, an
//! admissible lower bound on the distance of the whole key.
//!
//! Tile `i` covering key `[kb, ke)` gets the text window
//! `[kb - e, ke + (n - m) + e]` (clamped), where `e` is the error budget, `m`
//! the key length and `n` the text length. Any alignment of the whole key with
//! at most `e` edits maps the tile onto text inside that window, so the tile
//! minimum can only under-estimate its share of the edits.

use super::bpm::BpmPattern;
use super::kmer_filter::KmerCountingFilter;
use super::types::{Alignment, AlignmentTile, ALIGN_COLUMN_INF, ALIGN_DISTANCE_INF};

pub const DEFAULT_TILE_LENGTH: usize = 128;

/// Precompiled filters of one tile
#[derive(Debug, Clone)]
pub struct TileFilter {
    pub key_begin: usize,
    pub key_end: usize,
    pub kmer_filter: KmerCountingFilter,
    pub bpm_pattern: BpmPattern,
}

/// Filters for every tile of a key, compiled once per read
#[derive(Debug, Clone)]
pub struct AlignmentFilters {
    pub key_length: usize,
    pub tile_length: usize,
    pub tiles: Vec<TileFilter>,
}

impl AlignmentFilters {
    pub fn compile(key: &[u8], tile_length: usize, kmer_length: usize) -> Self {
        let tile_length = tile_length.max(1);
        let tiles = (0..key.len())
            .step_by(tile_length)
            .map(|key_begin| {
                let key_end = (key_begin + tile_length).min(key.len());
                let tile_key = &key[key_begin..key_end];
                TileFilter {
                    key_begin,
                    key_end,
                    kmer_filter: KmerCountingFilter::compile(tile_key, kmer_length),
                    bpm_pattern: BpmPattern::compile(tile_key),
                }
            })
            .collect();
        Self {
            key_length: key.len(),
            tile_length,
            tiles,
        }
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }
}

/// Lay out pending tiles and their text windows for one candidate text.
pub fn alignment_init(
    alignment: &mut Alignment,
    filters: &AlignmentFilters,
    text_length: u64,
    max_error: u64,
) {
    alignment.clear();
    let slack = text_length.saturating_sub(filters.key_length as u64) + max_error;
    for tile in &filters.tiles {
        let text_end = (tile.key_end as u64 + slack).min(text_length);
        let text_begin = (tile.key_begin as u64).saturating_sub(max_error).min(text_end);
        alignment.tiles.push(AlignmentTile::pending(
            tile.key_begin,
            tile.key_end,
            text_begin,
            text_end,
        ));
    }
}

/// k-mer bound for one tile. Returns the bound itself; the caller decides
/// against its budget.
pub fn alignment_verify_levenshtein_kmer_filter(
    tile: &AlignmentTile,
    filter: &TileFilter,
    text: &[u8],
) -> u64 {
    let window = &text[tile.text_begin_offset as usize..tile.text_end_offset as usize];
    filter.kmer_filter.min_distance_bound(window)
}

/// Verify every tile of `alignment` against `text` within `max_error` total.
///
/// Stops at the first tile whose cost exhausts the remaining budget and marks
/// the candidate discarded (`distance_min_bound == ALIGN_DISTANCE_INF`).
pub fn alignment_verify_levenshtein(
    alignment: &mut Alignment,
    filters: &AlignmentFilters,
    key: &[u8],
    text: &[u8],
    max_error: u64,
) {
    debug_assert_eq!(key.len(), filters.key_length);
    if alignment.tiles.len() != filters.tiles.len() {
        alignment_init(alignment, filters, text.len() as u64, max_error);
    }
    alignment.distance_min_bound = 0;
    for (index, filter) in filters.tiles.iter().enumerate() {
        let budget = max_error.saturating_sub(alignment.distance_min_bound);
        let tile = &mut alignment.tiles[index];
        let kmer_bound = alignment_verify_levenshtein_kmer_filter(tile, filter, text);
        if kmer_bound > budget {
            log::trace!(
                "tile [{},{}): k-mer bound {} over budget {}",
                tile.key_begin,
                tile.key_end,
                kmer_bound,
                budget
            );
            tile.distance = ALIGN_DISTANCE_INF;
            alignment.distance_min_bound = ALIGN_DISTANCE_INF;
            return;
        }
        let window = &text[tile.text_begin_offset as usize..tile.text_end_offset as usize];
        let (distance, column) = filter.bpm_pattern.verify(window, budget);
        if distance == ALIGN_DISTANCE_INF {
            log::trace!(
                "tile [{},{}): BPM over budget {}",
                tile.key_begin,
                tile.key_end,
                budget
            );
            tile.distance = ALIGN_DISTANCE_INF;
            alignment.distance_min_bound = ALIGN_DISTANCE_INF;
            return;
        }
        tile.distance = distance;
        tile.end_column = if column == ALIGN_COLUMN_INF {
            ALIGN_COLUMN_INF
        } else {
            tile.text_begin_offset + column
        };
        alignment.add_tile_bound(distance);
    }
}
