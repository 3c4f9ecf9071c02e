//! K-mer representation and manipulation.
//!
//! A k-mer is stored as a 2-bit packed integer, little-endian within the
//! packing: byte 0 of the conceptual backing storage holds the k-mer's
//! leftmost four bases. Encoding is fixed once and persisted: `A=0, C=1,
//! T=2, G=3`.
//!
//! Two widths are supported behind the [`KmerWord`] trait, matching the
//! "small number of fixed-width backends" design used throughout this
//! crate instead of generating one specialization per k-range: `u64` for
//! k <= 32 and `u128` for k <= 64. Callers pick a width via [`KmerLength`].

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, BitXor, Not, Shl, Shr};

use crate::error::KmtricksError;

/// Minimum accepted k-mer length.
pub const K_MIN: usize = 8;
/// Maximum accepted k-mer length (widest backend, `u128`).
pub const K_MAX: usize = 64;

/// A validated k-mer length in `[K_MIN, K_MAX)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KmerLength(usize);

impl KmerLength {
    /// Validates and wraps a k-mer length.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Input`] if `k` is outside `[K_MIN, K_MAX)`.
    pub fn new(k: usize) -> Result<Self, KmtricksError> {
        if !(K_MIN..K_MAX).contains(&k) {
            return Err(KmtricksError::Input {
                details: format!(
                    "k-mer length {k} out of range: must be in [{K_MIN}, {})",
                    K_MAX
                ),
            });
        }
        Ok(Self(k))
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Whether this length fits in a 64-bit word (k <= 32).
    #[must_use]
    pub const fn fits_u64(self) -> bool {
        self.0 <= 32
    }
}

/// A single DNA base (nucleotide), used to convert between ASCII bytes and
/// the 2-bit numeric encoding fixed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    A,
    C,
    T,
    G,
}

impl Base {
    #[must_use]
    pub const fn complement(self) -> Self {
        match self {
            Self::A => Self::T,
            Self::T => Self::A,
            Self::C => Self::G,
            Self::G => Self::C,
        }
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::A => 0,
            Self::C => 1,
            Self::T => 2,
            Self::G => 3,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0 => Self::A,
            1 => Self::C,
            2 => Self::T,
            _ => Self::G,
        }
    }

    #[must_use]
    pub const fn to_ascii(self) -> u8 {
        match self {
            Self::A => b'A',
            Self::C => b'C',
            Self::T => b'T',
            Self::G => b'G',
        }
    }
}

impl TryFrom<u8> for Base {
    type Error = KmtricksError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'A' | b'a' => Ok(Self::A),
            b'C' | b'c' => Ok(Self::C),
            b'T' | b't' => Ok(Self::T),
            b'G' | b'g' => Ok(Self::G),
            _ => Err(KmtricksError::Input {
                details: format!("invalid base byte 0x{byte:02x}"),
            }),
        }
    }
}

/// 256-entry reverse-complement byte table: for a byte packing four bases
/// (2 bits each, base 0 in the high bits, base 3 in the low bits), maps it
/// directly to the complemented byte with bases in the same order. Used by
/// [`reverse_complement_word`] together with a bit shift to fix up the
/// partial last byte, per the technique named in component 4.1.
const RC_BYTE_TABLE: [u8; 256] = build_rc_byte_table();

const fn build_rc_byte_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut byte = 0usize;
    while byte < 256 {
        let mut out = 0u8;
        let mut i = 0u8;
        while i < 4 {
            let code = ((byte as u8) >> (i * 2)) & 0b11;
            let comp = Base::from_code(code).complement().code();
            out |= comp << (i * 2);
            i += 1;
        }
        table[byte] = out;
        byte += 1;
    }
    table
}

/// Backing integer word for a packed k-mer: `u64` (k <= 32) or `u128`
/// (k <= 64). This is the trait-object boundary named in the design notes
/// between the generic scheduler/counter code and width-specific storage.
pub trait KmerWord:
    Copy
    + Clone
    + Eq
    + Ord
    + std::hash::Hash
    + fmt::Debug
    + Default
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitOrAssign
    + BitXor<Output = Self>
    + Not<Output = Self>
{
    const BITS: u32;
    const ZERO: Self;
    const ONE: Self;

    fn from_u64(v: u64) -> Self;
    fn to_u64_lossy(self) -> u64;
    fn wrapping_mul_u64(self, rhs: u64) -> Self;
}

impl KmerWord for u64 {
    const BITS: u32 = 64;
    const ZERO: Self = 0;
    const ONE: Self = 1;

    fn from_u64(v: u64) -> Self {
        v
    }
    fn to_u64_lossy(self) -> u64 {
        self
    }
    fn wrapping_mul_u64(self, rhs: u64) -> Self {
        self.wrapping_mul(rhs)
    }
}

impl KmerWord for u128 {
    const BITS: u32 = 128;
    const ZERO: Self = 0;
    const ONE: Self = 1;

    fn from_u64(v: u64) -> Self {
        u128::from(v)
    }
    fn to_u64_lossy(self) -> u64 {
        self as u64
    }
    fn wrapping_mul_u64(self, rhs: u64) -> Self {
        self.wrapping_mul(u128::from(rhs))
    }
}

/// A packed k-mer over backing word `W`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Kmer<W: KmerWord> {
    bits: W,
    k: usize,
}

impl<W: KmerWord> Kmer<W> {
    #[must_use]
    pub const fn from_bits(bits: W, k: usize) -> Self {
        Self { bits, k }
    }

    #[must_use]
    pub const fn bits(self) -> W {
        self.bits
    }

    #[must_use]
    pub const fn k(self) -> usize {
        self.k
    }

    fn mask(k: usize) -> W {
        if 2 * k >= W::BITS as usize {
            !W::ZERO
        } else {
            (W::ONE << (2 * k) as u32) - W::ONE
        }
    }

    /// 2-bit packs an ASCII DNA string. Undefined which garbage bits are
    /// produced if `s` contains non-ACGT bytes; callers must split at
    /// ambiguous positions before calling this (component 4.1).
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Input`] naming the offending byte's
    /// position if `s` contains a non-ACGT byte.
    pub fn encode(s: &[u8]) -> Result<Self, KmtricksError> {
        let mut bits = W::ZERO;
        for (i, &byte) in s.iter().enumerate() {
            let base = Base::try_from(byte).map_err(|_| KmtricksError::Input {
                details: format!("invalid base '{}' at position {i}", byte as char),
            })?;
            bits = (bits << 2) | W::from_u64(u64::from(base.code()));
        }
        Ok(Self { bits, k: s.len() })
    }

    /// Unpacks back to an ASCII DNA string of length `self.k()`.
    #[must_use]
    pub fn decode(self) -> Vec<u8> {
        let k = self.k;
        let mut out = vec![0u8; k];
        for i in 0..k {
            let shift = 2 * (k - 1 - i);
            let code = (self.bits.to_u64_lossy() >> shift.min(63)) & 0b11;
            let code = if shift >= 64 { 0 } else { code };
            out[i] = Base::from_code(code as u8).to_ascii();
        }
        out
    }

    /// Reverse complement, byte-table + shift technique (component 4.1).
    #[must_use]
    pub fn reverse_complement(self) -> Self {
        let k = self.k;
        let nbytes = k.div_ceil(4);
        let raw = self.bits.to_u64_lossy();
        let mut bytes = vec![0u8; nbytes];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let shift = i * 8;
            *byte = if shift < 64 {
                ((raw >> shift) & 0xFF) as u8
            } else {
                0
            };
        }
        let mut rc_bytes = vec![0u8; nbytes];
        for (i, &b) in bytes.iter().enumerate() {
            rc_bytes[nbytes - 1 - i] = RC_BYTE_TABLE[b as usize];
        }
        let mut rc = 0u64;
        for &b in &rc_bytes {
            rc = (rc << 8) | u64::from(b);
        }
        // shift to compensate for the partial high byte when k % 4 != 0
        let pad_bits = (nbytes * 4 - k) * 2;
        let rc = rc >> pad_bits;
        Self {
            bits: W::from_u64(rc) & Self::mask(k),
            k,
        }
    }

    /// Canonical form: lexicographic minimum of self and reverse
    /// complement, comparing packed bit patterns (which matches ASCII
    /// lexicographic order for this encoding since code order A<C<T<G
    /// mirrors ASCII order A<C<G<T only up to relabeling - comparisons are
    /// always done on bits against bits, never bits against ASCII).
    #[must_use]
    pub fn canonical(self) -> Self {
        let rc = self.reverse_complement();
        if rc.bits < self.bits {
            rc
        } else {
            self
        }
    }

    /// Forward-shift by one base: drop the leftmost base, append `base` on
    /// the right, masked to `2k` bits.
    #[must_use]
    pub fn shift_in(self, base: Base) -> Self {
        let shifted = (self.bits << 2) | W::from_u64(u64::from(base.code()));
        Self {
            bits: shifted & Self::mask(self.k),
            k: self.k,
        }
    }

    /// Reverse-strand dual of `shift_in`: prepend the complement of `base`
    /// on the left of a right-to-left (reverse-complement) walk.
    #[must_use]
    pub fn shift_in_rc(self, base: Base) -> Self {
        let comp = base.complement();
        let top_shift = 2 * (self.k - 1);
        let prefix = W::from_u64(u64::from(comp.code())) << top_shift as u32;
        let shifted = (self.bits >> 2) | prefix;
        Self {
            bits: shifted & Self::mask(self.k),
            k: self.k,
        }
    }

    /// Rightmost m-mer starting at `offset` bases from the left.
    #[must_use]
    pub fn extract_mmer(self, offset: usize, m: usize) -> u32 {
        let from_right = self.k - offset - m;
        let shifted = self.bits >> (2 * from_right) as u32;
        (shifted.to_u64_lossy() & ((1u64 << (2 * m)) - 1)) as u32
    }

    /// A fast, well-distributed 64-bit hash of the packed representation,
    /// specialized per word width. This is the xxhash-family member of the
    /// dual hasher interface; [`byte_reversal_hash`] is the other.
    #[must_use]
    pub fn fast_hash(self) -> u64 {
        let mut x = self.bits.to_u64_lossy() ^ (self.k as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        x ^= x >> 33;
        x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
        x ^= x >> 33;
        x = x.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
        x ^= x >> 33;
        x
    }

    /// Byte-reversal hash: reverses the byte order of the packed word and
    /// mixes it in. Kept for compatibility with existing run directories
    /// that were built against the byte-reversal hasher (design notes §9).
    #[must_use]
    pub fn byte_reversal_hash(self) -> u64 {
        let raw = self.bits.to_u64_lossy();
        let reversed = raw.swap_bytes();
        reversed ^ reversed.rotate_left(17)
    }
}

/// Which [`Kmer::fast_hash`]/[`Kmer::byte_reversal_hash`] a stage should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashKind {
    #[default]
    Fast,
    ByteReversal,
}

impl HashKind {
    pub fn hash<W: KmerWord>(self, kmer: Kmer<W>) -> u64 {
        match self {
            Self::Fast => kmer.fast_hash(),
            Self::ByteReversal => kmer.byte_reversal_hash(),
        }
    }
}

/// Splits a read into maximal runs over `{A,C,G,T}`, discarding ambiguous
/// bases (N and others). Mirrors component 4.4's "split at ambiguous bases".
pub fn split_at_ambiguous(seq: &[u8]) -> Vec<&[u8]> {
    seq.split(|b| Base::try_from(*b).is_err())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        for seq in ["ACGT", "AAAA", "TTTT", "CCCC", "GGGG", "GATTACA"] {
            let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();
            assert_eq!(kmer.decode(), seq.as_bytes());
        }
    }

    #[test]
    fn encode_decode_roundtrip_all_lengths() {
        for k in K_MIN..32 {
            let seq = "ACGT".repeat(k).into_bytes()[..k].to_vec();
            let kmer = Kmer::<u64>::encode(&seq).unwrap();
            assert_eq!(kmer.decode(), seq);
        }
    }

    #[test]
    fn invalid_base_reports_position() {
        let err = Kmer::<u64>::encode(b"ACGTN").unwrap_err();
        assert!(err.to_string().contains("position 4"));
    }

    #[test]
    fn canonical_stability() {
        let kmer = Kmer::<u64>::encode(b"GATTACA").unwrap();
        let c1 = kmer.canonical();
        let c2 = c1.canonical();
        assert_eq!(c1, c2);
        let rc = kmer.reverse_complement();
        assert_eq!(rc.canonical(), kmer.canonical());
    }

    #[test]
    fn canonical_picks_smaller_bits() {
        let aaa = Kmer::<u64>::encode(b"AAA").unwrap();
        let ttt = Kmer::<u64>::encode(b"TTT").unwrap();
        assert_eq!(aaa.canonical().decode(), b"AAA");
        assert_eq!(ttt.canonical().decode(), b"AAA");
    }

    #[test]
    fn palindrome_is_its_own_canonical_partner() {
        // ACGT reverse complement is ACGT itself.
        let kmer = Kmer::<u64>::encode(b"ACGT").unwrap();
        assert_eq!(kmer.reverse_complement(), kmer);
        assert_eq!(kmer.canonical(), kmer);
    }

    #[test]
    fn reverse_complement_is_involutive() {
        for seq in ["ACGTACGT", "GATTACAG", "TTTTTTTT"] {
            let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();
            assert_eq!(kmer.reverse_complement().reverse_complement(), kmer);
        }
    }

    #[test]
    fn shift_in_matches_resliced_window() {
        let window = Kmer::<u64>::encode(b"ACGTA").unwrap();
        let shifted = window.shift_in(Base::C);
        assert_eq!(shifted.decode(), b"CGTAC");
    }

    #[test]
    fn extract_mmer_rightmost() {
        let kmer = Kmer::<u64>::encode(b"ACGTACGT").unwrap();
        let mmer = kmer.extract_mmer(4, 4);
        let expected = Kmer::<u64>::encode(b"ACGT").unwrap().bits();
        assert_eq!(u64::from(mmer), expected);
    }

    #[test]
    fn kmer_length_rejects_out_of_range() {
        assert!(KmerLength::new(4).is_err());
        assert!(KmerLength::new(K_MAX).is_err());
        assert!(KmerLength::new(K_MIN).is_ok());
    }

    #[test]
    fn wide_kmer_u128() {
        let seq = "ACGT".repeat(13); // 52 bases
        let kmer = Kmer::<u128>::encode(seq.as_bytes()).unwrap();
        assert_eq!(kmer.decode(), seq.as_bytes());
        assert_eq!(kmer.reverse_complement().reverse_complement(), kmer);
    }

    #[test]
    fn split_at_ambiguous_breaks_runs() {
        let runs = split_at_ambiguous(b"ACGTNNNACGT");
        assert_eq!(runs, vec![b"ACGT".as_slice(), b"ACGT".as_slice()]);
    }
}
