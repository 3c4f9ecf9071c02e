//! Partition counting (component §4.5): reconstruct k-mers from a
//! partition's super-k-mers, sort and run-length collapse into
//! `(key, abundance)` pairs, in either `kmer` or `hash` key space.
//!
//! Two counting strategies mirror the original's vector / hash-map-spill
//! split: `count_partition` always collects and sorts in memory (vector
//! mode); [`count_partition_budgeted`] checks the partition's estimated
//! footprint against a memory cap first and, if it would overflow, streams
//! through a bounded open-addressed table instead, spilling sorted runs to
//! disk and N-way merging them (`count_partition_spilled`).
//!
//! Hash-mode keys are restricted to their partition's `w`-wide sub-window
//! via [`HashWindow`], the invariant the Bloom projection (component §4.7)
//! relies on.

use std::path::{Path, PathBuf};

use crate::binformat::KmerFileHeader;
use crate::error::KmtricksError;
use crate::histogram::Histogram;
use crate::kmer::{HashKind, Kmer, KmerWord};
use crate::superkmer::PartitionReader;

/// Number of kx-classes used to bucket k-mers by their top 2 bits before
/// the fine sort, per design notes (fixed at 4 non-trivial classes plus
/// class 0 for the all-`A`-prefix bucket).
pub const KX_CLASSES: usize = 5;

/// One counted entry: a canonical key (packed k-mer bits, or a hash) and
/// its abundance in this partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountedKmer {
    pub key: u64,
    pub count: u32,
}

/// Which key space a count file stores, mirroring [`crate::config::KeySpace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKeySpace {
    Kmer,
    Hash(HashKind),
}

/// Restricts a hash-mode key to one partition's `w`-wide sub-window of the
/// `P * w` hash space, the invariant the Bloom projection (component §4.7)
/// relies on: partition `p` only ever produces keys in `[p*w, (p+1)*w)`.
#[derive(Debug, Clone, Copy)]
pub struct HashWindow {
    pub w: usize,
    pub partition: u16,
}

fn windowed_key(hash: u64, window: Option<HashWindow>) -> u64 {
    match window {
        Some(hw) if hw.w > 0 => hw.partition as u64 * hw.w as u64 + (hash % hw.w as u64),
        _ => hash,
    }
}

/// Assigns a k-mer to a kx-class bucket by its top 2 bits, the coarse
/// partitioning pass before the fine in-bucket sort.
#[must_use]
pub fn kx_class<W: KmerWord>(kmer: Kmer<W>) -> usize {
    let k = kmer.k();
    let top_shift = 2 * (k - 1);
    let top_bits = (kmer.bits().to_u64_lossy() >> top_shift.min(63)) & 0b11;
    if top_shift >= 64 {
        0
    } else {
        (top_bits as usize) + 1
    }
    .min(KX_CLASSES - 1)
}

/// Reads every super-k-mer in `partition_path`, reconstructs its k-mers,
/// sorts by key (bucketed by kx-class, then sorted within bucket), and
/// collapses adjacent duplicates into abundance counts. Keys below
/// `hard_min` are dropped before being written out, matching the "hard-min
/// is applied at counting time" rule (component §5).
///
/// # Errors
///
/// Returns [`KmtricksError::Io`]/[`KmtricksError::Format`] on a malformed
/// partition file, or [`KmtricksError::Input`] for an invalid k-mer byte.
pub fn count_partition<W: KmerWord>(
    partition_path: &Path,
    k: usize,
    key_space: CountKeySpace,
    hard_min: u32,
    window: Option<HashWindow>,
    histogram: Option<&mut Histogram>,
) -> Result<Vec<CountedKmer>, KmtricksError> {
    let reader = PartitionReader::open(partition_path, k)?;
    let mut buckets: Vec<Vec<u64>> = vec![Vec::new(); KX_CLASSES];

    for sk in reader {
        let sk = sk?;
        for kmer in sk.kmers::<W>(k)? {
            let canonical = kmer.canonical();
            let key = match key_space {
                CountKeySpace::Kmer => canonical.bits().to_u64_lossy(),
                CountKeySpace::Hash(kind) => windowed_key(kind.hash(canonical), window),
            };
            buckets[kx_class(canonical)].push(key);
        }
    }

    let mut out = Vec::new();
    for bucket in &mut buckets {
        bucket.sort_unstable();
        collapse_run_lengths(bucket, hard_min, &mut out);
    }

    if let Some(hist) = histogram {
        for entry in &out {
            hist.record(entry.count);
        }
    }

    out.sort_unstable_by_key(|c| c.key);
    Ok(out)
}

fn collapse_run_lengths(sorted: &[u64], hard_min: u32, out: &mut Vec<CountedKmer>) {
    let mut iter = sorted.iter().peekable();
    while let Some(&key) = iter.next() {
        let mut count: u32 = 1;
        while iter.peek() == Some(&&key) {
            iter.next();
            count = count.saturating_add(1);
        }
        if count >= hard_min {
            out.push(CountedKmer { key, count });
        }
    }
}

/// Estimated in-memory footprint of counting a partition with `nb_kmers`
/// entries, 12 bytes per `(u64 key, u32 count)` pair.
#[must_use]
pub const fn estimate_partition_bytes(nb_kmers: u64) -> u64 {
    nb_kmers * 12
}

/// As [`count_partition`], but checks the estimated footprint against
/// `memory_cap_bytes` first and falls back to [`count_partition_spilled`]
/// (component §4.5's "hash-map accumulate, spill on overflow" strategy)
/// instead of sorting the whole partition in memory.
///
/// # Errors
///
/// Returns whatever [`count_partition`] or [`count_partition_spilled`]
/// return for a malformed partition file.
pub fn count_partition_budgeted<W: KmerWord>(
    partition_path: &Path,
    partition_id: u16,
    k: usize,
    key_space: CountKeySpace,
    hard_min: u32,
    nb_kmers_hint: u64,
    memory_cap_bytes: u64,
    window: Option<HashWindow>,
    histogram: Option<&mut Histogram>,
) -> Result<Vec<CountedKmer>, KmtricksError> {
    let estimate = estimate_partition_bytes(nb_kmers_hint);
    if estimate <= memory_cap_bytes {
        return count_partition::<W>(partition_path, k, key_space, hard_min, window, histogram);
    }
    count_partition_spilled::<W>(
        partition_path,
        partition_id,
        k,
        key_space,
        hard_min,
        memory_cap_bytes,
        window,
        histogram,
    )
}

/// A bounded open-addressed `u64 -> u32` table, linear-probed, used as the
/// in-memory accumulator for [`count_partition_spilled`]. Fills to roughly
/// 70% load factor before the caller flushes it to a sorted run.
struct SpillTable {
    keys: Vec<Option<u64>>,
    counts: Vec<u32>,
    len: usize,
    capacity: usize,
}

impl SpillTable {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(16);
        Self {
            keys: vec![None; capacity],
            counts: vec![0u32; capacity],
            len: 0,
            capacity,
        }
    }

    fn is_full(&self) -> bool {
        self.len * 10 >= self.capacity * 7
    }

    fn insert(&mut self, key: u64) {
        let mut idx = (key as usize) % self.capacity;
        loop {
            match self.keys[idx] {
                Some(k) if k == key => {
                    self.counts[idx] = self.counts[idx].saturating_add(1);
                    return;
                }
                None => {
                    self.keys[idx] = Some(key);
                    self.counts[idx] = 1;
                    self.len += 1;
                    return;
                }
                Some(_) => idx = (idx + 1) % self.capacity,
            }
        }
    }

    /// Empties the table into a key-sorted run, ready to spill or merge.
    fn drain_sorted(&mut self) -> Vec<(u64, u32)> {
        let mut out: Vec<(u64, u32)> = self
            .keys
            .iter_mut()
            .zip(self.counts.iter_mut())
            .filter_map(|(k, c)| k.take().map(|k| (k, std::mem::take(c))))
            .collect();
        out.sort_unstable_by_key(|&(k, _)| k);
        self.len = 0;
        out
    }
}

fn write_sorted_run(path: &Path, run: &[(u64, u32)]) -> Result<(), KmtricksError> {
    use std::io::Write;
    let file = std::fs::File::create(path).map_err(|e| KmtricksError::io(e, path))?;
    let mut w = std::io::BufWriter::new(file);
    for &(key, count) in run {
        w.write_all(&key.to_le_bytes()).map_err(|e| KmtricksError::io(e, path))?;
        w.write_all(&count.to_le_bytes()).map_err(|e| KmtricksError::io(e, path))?;
    }
    Ok(())
}

fn read_sorted_run(path: &Path) -> Result<Vec<(u64, u32)>, KmtricksError> {
    use std::io::Read;
    let mut file = std::fs::File::open(path).map_err(|e| KmtricksError::io(e, path))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(|e| KmtricksError::io(e, path))?;
    Ok(buf
        .chunks_exact(12)
        .map(|c| {
            let key = u64::from_le_bytes(c[0..8].try_into().unwrap());
            let count = u32::from_le_bytes(c[8..12].try_into().unwrap());
            (key, count)
        })
        .collect())
}

/// N-way merges already-sorted `(key, count)` runs, summing counts for keys
/// shared across runs and dropping anything below `hard_min`, matching
/// [`collapse_run_lengths`]'s threshold semantics.
fn merge_sorted_runs(runs: &[Vec<(u64, u32)>], hard_min: u32) -> Vec<CountedKmer> {
    let mut cursors = vec![0usize; runs.len()];
    let mut out = Vec::new();
    loop {
        let min_key = runs
            .iter()
            .zip(&cursors)
            .filter_map(|(run, &c)| run.get(c).map(|&(k, _)| k))
            .min();
        let Some(min_key) = min_key else {
            break;
        };
        let mut total = 0u32;
        for (run, cursor) in runs.iter().zip(cursors.iter_mut()) {
            if run.get(*cursor).is_some_and(|&(k, _)| k == min_key) {
                total = total.saturating_add(run[*cursor].1);
                *cursor += 1;
            }
        }
        if total >= hard_min {
            out.push(CountedKmer {
                key: min_key,
                count: total,
            });
        }
    }
    out
}

/// Streams `partition_path`'s k-mers through a [`SpillTable`] capped to
/// `memory_cap_bytes`, spilling a sorted run to disk each time it fills,
/// then N-way merges the spilled runs with whatever remains in memory at
/// end of stream (component §4.5's memory-budget fallback).
///
/// # Errors
///
/// Returns [`KmtricksError::Io`]/[`KmtricksError::Format`] on a malformed
/// partition file or spill I/O failure.
fn count_partition_spilled<W: KmerWord>(
    partition_path: &Path,
    partition_id: u16,
    k: usize,
    key_space: CountKeySpace,
    hard_min: u32,
    memory_cap_bytes: u64,
    window: Option<HashWindow>,
    histogram: Option<&mut Histogram>,
) -> Result<Vec<CountedKmer>, KmtricksError> {
    let capacity = (memory_cap_bytes / 12).max(16) as usize;
    let mut table = SpillTable::new(capacity);
    let mut run_paths: Vec<PathBuf> = Vec::new();

    let reader = PartitionReader::open(partition_path, k)?;
    for sk in reader {
        let sk = sk?;
        for kmer in sk.kmers::<W>(k)? {
            let canonical = kmer.canonical();
            let key = match key_space {
                CountKeySpace::Kmer => canonical.bits().to_u64_lossy(),
                CountKeySpace::Hash(kind) => windowed_key(kind.hash(canonical), window),
            };
            table.insert(key);
            if table.is_full() {
                let run = table.drain_sorted();
                let run_path =
                    partition_path.with_extension(format!("p{partition_id}.spill{}", run_paths.len()));
                write_sorted_run(&run_path, &run)?;
                run_paths.push(run_path);
            }
        }
    }

    let mut runs: Vec<Vec<(u64, u32)>> = Vec::with_capacity(run_paths.len() + 1);
    for path in &run_paths {
        runs.push(read_sorted_run(path)?);
    }
    for path in &run_paths {
        std::fs::remove_file(path).ok();
    }
    runs.push(table.drain_sorted());

    let out = merge_sorted_runs(&runs, hard_min);
    if let Some(hist) = histogram {
        for entry in &out {
            hist.record(entry.count);
        }
    }
    Ok(out)
}

/// Writes a count file: a [`KmerFileHeader`] followed by `(key, count)`
/// pairs, key width depending on `key_space`.
///
/// # Errors
///
/// Returns [`KmtricksError::Io`] on write failure.
pub fn write_count_file(
    path: &Path,
    sample_id: &str,
    partition_id: u16,
    k: u16,
    key_space: CountKeySpace,
    entries: &[CountedKmer],
) -> Result<(), KmtricksError> {
    let header = KmerFileHeader {
        key_width: if k > 32 { 16 } else { 8 },
        count_width: 4,
        sample_id: sample_id.to_string(),
        partition_id,
        k,
        is_compressed: false,
        is_hashes: matches!(key_space, CountKeySpace::Hash(_)),
    };
    header.write(path)?;

    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| KmtricksError::io(e, path))?;
    for entry in entries {
        f.write_all(&entry.key.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
        f.write_all(&entry.count.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::superkmer::{PartitionWriter, SuperKmer};
    use tempfile::tempdir;

    #[test]
    fn collapse_run_lengths_counts_duplicates() {
        let sorted = vec![1u64, 1, 1, 2, 3, 3];
        let mut out = Vec::new();
        collapse_run_lengths(&sorted, 1, &mut out);
        assert_eq!(
            out,
            vec![
                CountedKmer { key: 1, count: 3 },
                CountedKmer { key: 2, count: 1 },
                CountedKmer { key: 3, count: 2 },
            ]
        );
    }

    #[test]
    fn hard_min_filters_low_abundance() {
        let sorted = vec![1u64, 2, 2, 2];
        let mut out = Vec::new();
        collapse_run_lengths(&sorted, 2, &mut out);
        assert_eq!(out, vec![CountedKmer { key: 2, count: 3 }]);
    }

    #[test]
    fn count_partition_reconstructs_and_collapses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p0.bin");
        let writer = PartitionWriter::create(&path).unwrap();
        // two identical super-k-mers so every k-mer is duplicated
        let sk = SuperKmer::encode(b"ACGTACGT", 4).unwrap();
        writer.write_block(&[sk.clone(), sk]).unwrap();
        writer.close().unwrap();

        let counted =
            count_partition::<u64>(&path, 5, CountKeySpace::Kmer, 1, None, None).unwrap();
        assert!(counted.iter().all(|c| c.count == 2));
        assert_eq!(counted.len(), 4);
    }

    #[test]
    fn hash_mode_restricts_keys_to_partition_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p2.bin");
        let writer = PartitionWriter::create(&path).unwrap();
        let sk = SuperKmer::encode(b"ACGTACGTACGT", 4).unwrap();
        writer.write_block(&[sk]).unwrap();
        writer.close().unwrap();

        let window = HashWindow { w: 256, partition: 2 };
        let counted = count_partition::<u64>(
            &path,
            5,
            CountKeySpace::Hash(HashKind::Fast),
            1,
            Some(window),
            None,
        )
        .unwrap();
        assert!(!counted.is_empty());
        for c in &counted {
            assert!(c.key >= 2 * 256 && c.key < 3 * 256);
        }
    }

    #[test]
    fn budgeted_falls_back_to_spill_and_matches_vector_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p0.bin");
        let writer = PartitionWriter::create(&path).unwrap();
        let sk = SuperKmer::encode(b"ACGTACGTACGTACGTACGT", 4).unwrap();
        writer.write_block(&[sk.clone(), sk]).unwrap();
        writer.close().unwrap();

        let direct = count_partition::<u64>(&path, 5, CountKeySpace::Kmer, 1, None, None).unwrap();
        let spilled = count_partition_budgeted::<u64>(
            &path,
            3,
            5,
            CountKeySpace::Kmer,
            1,
            1_000_000,
            16, // tiny cap routes through the spill accumulator
            None,
            None,
        )
        .unwrap();

        let mut direct_sorted = direct.clone();
        direct_sorted.sort_unstable_by_key(|c| c.key);
        let mut spilled_sorted = spilled.clone();
        spilled_sorted.sort_unstable_by_key(|c| c.key);
        assert_eq!(direct_sorted, spilled_sorted);
    }

    #[test]
    fn budgeted_stays_on_vector_path_under_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p1.bin");
        PartitionWriter::create(&path).unwrap().close().unwrap();
        let out = count_partition_budgeted::<u64>(
            &path,
            0,
            21,
            CountKeySpace::Kmer,
            1,
            10,
            1_000_000,
            None,
            None,
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn write_count_file_round_trips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.bin");
        let entries = vec![CountedKmer { key: 42, count: 7 }];
        write_count_file(&path, "A", 0, 21, CountKeySpace::Kmer, &entries).unwrap();
        let header = KmerFileHeader::read(&path).unwrap();
        assert_eq!(header.sample_id, "A");
        assert_eq!(header.k, 21);
    }
}
