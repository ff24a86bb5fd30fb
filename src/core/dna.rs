//! Nucleotide encoding shared by every kernel.
//!
//! All alignment code works on encoded sequences: A=0, C=1, G=2, T=3 and
//! anything else collapses to N=4.

pub const ENC_DNA_CHAR_A: u8 = 0;
pub const ENC_DNA_CHAR_C: u8 = 1;
pub const ENC_DNA_CHAR_G: u8 = 2;
pub const ENC_DNA_CHAR_T: u8 = 3;
pub const ENC_DNA_CHAR_N: u8 = 4;

/// Number of encoded symbols (A, C, G, T, N)
pub const DNA_RANGE: usize = 5;

/// ASCII -> encoded nucleotide (A/a=0, C/c=1, G/g=2, T/t=3, else 4)
pub const NST_NT4_TABLE: [u8; 256] = [
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 0, 4, 1, 4, 4, 4, 2, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 0, 4, 1, 4, 4, 4, 2, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
];

/// Encode one ASCII nucleotide
#[inline(always)]
pub const fn dna_encode(c: u8) -> u8 {
    NST_NT4_TABLE[c as usize]
}

/// Convert an encoded base back to its ASCII character
#[inline(always)]
pub const fn dna_decode(b: u8) -> u8 {
    match b {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        3 => b'T',
        _ => b'N',
    }
}

/// Complement of an encoded base (N stays N)
#[inline(always)]
pub const fn dna_complement(b: u8) -> u8 {
    if b < 4 {
        3 - b
    } else {
        ENC_DNA_CHAR_N
    }
}

/// True for the four canonical nucleotides in either case
#[inline]
pub fn is_dna(c: u8) -> bool {
    matches!(c, b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't')
}

pub fn encode_sequence(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&c| dna_encode(c)).collect()
}

pub fn decode_sequence(seq: &[u8]) -> String {
    seq.iter().map(|&b| dna_decode(b) as char).collect()
}

/// Reverse complement of an encoded sequence
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| dna_complement(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        assert_eq!(encode_sequence(b"ACGTNacgtx"), vec![0, 1, 2, 3, 4, 0, 1, 2, 3, 4]);
        assert_eq!(decode_sequence(&[0, 1, 2, 3, 4, 9]), "ACGTNN");
    }

    #[test]
    fn test_reverse_complement() {
        let seq = encode_sequence(b"AACGTN");
        assert_eq!(decode_sequence(&reverse_complement(&seq)), "NACGTT");
    }

    #[test]
    fn test_is_dna() {
        assert!(is_dna(b'a'));
        assert!(is_dna(b'T'));
        assert!(!is_dna(b'N'));
        assert!(!is_dna(b'-'));
    }
}
