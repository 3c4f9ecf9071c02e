//! Property-based tests for k-mer encode/canonical/hash invariants.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use kmtricks::kmer::Kmer;
use proptest::prelude::*;

fn dna_sequence(len: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec(prop_oneof!(Just('A'), Just('C'), Just('T'), Just('G')), len)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn encode_decode_roundtrips(seq in dna_sequence(21)) {
        let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();
        prop_assert_eq!(kmer.decode(), seq.as_bytes().to_vec());
    }

    #[test]
    fn reverse_complement_is_involution(seq in dna_sequence(21)) {
        let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();
        prop_assert_eq!(kmer.reverse_complement().reverse_complement(), kmer);
    }

    #[test]
    fn canonical_is_idempotent(seq in dna_sequence(21)) {
        let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();
        let canon = kmer.canonical();
        prop_assert_eq!(canon.canonical(), canon);
    }

    #[test]
    fn canonical_matches_either_orientation(seq in dna_sequence(21)) {
        let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();
        let canon = kmer.canonical();
        prop_assert!(canon == kmer || canon == kmer.reverse_complement());
    }

    #[test]
    fn canonical_is_orientation_independent(seq in dna_sequence(21)) {
        let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();
        let rc = kmer.reverse_complement();
        prop_assert_eq!(kmer.canonical(), rc.canonical());
    }

    #[test]
    fn fast_hash_is_deterministic(seq in dna_sequence(21)) {
        let kmer = Kmer::<u64>::encode(seq.as_bytes()).unwrap();
        prop_assert_eq!(kmer.fast_hash(), kmer.fast_hash());
    }
}
