//! k-mer counting filter (q-gram lemma).
//!
//! A key with `n` k-mers aligned with `d` edits keeps at least `n - d*k` of
//! them intact in the text, since one edit touches at most `k` overlapping
//! k-mers. Counting how many key k-mers the text can supply therefore gives
//! `ceil(missing / k)` as a lower bound on the edit distance. The bound may
//! under-estimate but never over-estimates.

use super::workspace::with_workspace;

/// Default k-mer length used by the tile verifier
pub const DEFAULT_KMER_LENGTH: usize = 5;

/// Longest k-mer the 2-bit table supports
pub const MAX_KMER_LENGTH: usize = 8;

/// Key-side k-mer profile, built once per key (or tile)
#[derive(Debug, Clone)]
pub struct KmerCountingFilter {
    kmer_length: usize,
    counts: Vec<u32>,
    num_kmers: u64,
}

/// Feed the 2-bit code of every k-mer free of N to `f`.
#[inline]
fn for_each_kmer(seq: &[u8], k: usize, mut f: impl FnMut(usize)) {
    let mask = (1usize << (2 * k)) - 1;
    let mut code = 0usize;
    let mut valid = 0usize;
    for &base in seq {
        if base > 3 {
            valid = 0;
            code = 0;
            continue;
        }
        code = ((code << 2) | base as usize) & mask;
        valid += 1;
        if valid >= k {
            f(code);
        }
    }
}

impl KmerCountingFilter {
    /// Profile an encoded key. `kmer_length` is clamped to `1..=MAX_KMER_LENGTH`.
    pub fn compile(key: &[u8], kmer_length: usize) -> Self {
        let k = kmer_length.clamp(1, MAX_KMER_LENGTH);
        let mut counts = vec![0u32; 1 << (2 * k)];
        let mut num_kmers = 0u64;
        for_each_kmer(key, k, |code| {
            counts[code] = counts[code].saturating_add(1);
            num_kmers += 1;
        });
        Self {
            kmer_length: k,
            counts,
            num_kmers,
        }
    }

    pub fn kmer_length(&self) -> usize {
        self.kmer_length
    }

    pub fn num_kmers(&self) -> u64 {
        self.num_kmers
    }

    /// Lower bound on the edit distance of the key against any span of `text`
    pub fn min_distance_bound(&self, text: &[u8]) -> u64 {
        if self.num_kmers == 0 {
            return 0;
        }
        let matched = with_workspace(|ws| {
            let available = ws.ensure_kmer_counts(self.counts.len());
            available.copy_from_slice(&self.counts);
            let mut matched = 0u64;
            for_each_kmer(text, self.kmer_length, |code| {
                if available[code] > 0 {
                    available[code] -= 1;
                    matched += 1;
                }
            });
            matched
        });
        let missing = self.num_kmers - matched;
        missing.div_ceil(self.kmer_length as u64)
    }
}

/// One-shot bound for a key/text pair
pub fn kmer_distance_bound(key: &[u8], text: &[u8], kmer_length: usize) -> u64 {
    KmerCountingFilter::compile(key, kmer_length).min_distance_bound(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dna::encode_sequence;

    #[test]
    fn test_exact_match_bound_zero() {
        let key = encode_sequence(b"ACGTACGTTGCA");
        assert_eq!(kmer_distance_bound(&key, &key, 5), 0);
    }

    #[test]
    fn test_single_substitution_bound() {
        let key = encode_sequence(b"ACGTACGT");
        let text = encode_sequence(b"ACGTTCGT");
        assert!(kmer_distance_bound(&key, &text, 5) <= 1);
    }

    #[test]
    fn test_unrelated_text_bound_positive() {
        let key = encode_sequence(b"ACGTACGTACGTACGTACGT");
        let text = encode_sequence(b"TTTTTTTTTTTTTTTTTTTT");
        // 16 key k-mers, none in the text
        assert_eq!(kmer_distance_bound(&key, &text, 5), 4);
    }

    #[test]
    fn test_multiplicity_respected() {
        let key = encode_sequence(b"AAAAAAAAAA");
        let text = encode_sequence(b"AAAAAA");
        // 6 key k-mers, text supplies only 2
        assert_eq!(kmer_distance_bound(&key, &text, 5), 1);
    }

    #[test]
    fn test_n_kmers_skipped() {
        let key = encode_sequence(b"ACGNNACG");
        assert_eq!(KmerCountingFilter::compile(&key, 3).num_kmers(), 2);
        assert_eq!(kmer_distance_bound(&key, &encode_sequence(b"ACG"), 3), 1);
    }

    #[test]
    fn test_short_key() {
        let key = encode_sequence(b"ACG");
        assert_eq!(kmer_distance_bound(&key, &encode_sequence(b"TTTT"), 5), 0);
    }

    #[test]
    fn test_highly_repetitive_key_counts_every_kmer() {
        // More copies of one k-mer than a 16-bit count holds
        let key = vec![0u8; 70_000];
        assert_eq!(kmer_distance_bound(&key, &key, 5), 0);
        assert_eq!(kmer_distance_bound(&key, &key[..69_000], 5), 200);
    }
}
