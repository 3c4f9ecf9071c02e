//! Partition merging (component §4.6): an N-way heap merge across one
//! partition's per-sample count files, applying the solidity predicates in
//! the order grounded on the original `Merger<K,C,F>::next()`
//! (`libs/kmtricks/merger.hpp`): hard-min is pre-applied by the counter,
//! then soft-min decides per-sample solidity, then recurrence-min decides
//! whether the row is kept at all, then share-min rescues rows that missed
//! soft-min in enough samples anyway.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::binformat::KmerFileHeader;
use crate::error::KmtricksError;

/// Per-sample soft-min: either the same threshold for every sample, or a
/// distinct one per sample index (component §6's `! <n>` fof override).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftMinPolicy {
    Uniform(u32),
    PerSample(Vec<u32>),
}

impl SoftMinPolicy {
    fn threshold(&self, sample_idx: usize) -> u32 {
        match self {
            Self::Uniform(t) => *t,
            Self::PerSample(v) => v[sample_idx],
        }
    }
}

/// Sequential reader over one sample's count file for a partition. Keys are
/// always stored as 8-byte little-endian values (`CountedKmer::key` is
/// `u64`); `key_width` is carried in the header for diagnostics only.
struct CountFileReader {
    reader: BufReader<File>,
    exhausted: bool,
}

impl CountFileReader {
    fn open(path: &Path) -> Result<(Self, KmerFileHeader), KmtricksError> {
        let header = KmerFileHeader::read(path)?;
        let file = File::open(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut reader = BufReader::new(file);
        // skip header bytes already parsed by KmerFileHeader::read; re-seek
        // past them by re-reading the same prefix length, since the header
        // type hides its own on-disk size.
        skip_header(&mut reader, &header, path)?;
        Ok((
            Self {
                reader,
                exhausted: false,
            },
            header,
        ))
    }

    fn read_next(&mut self) -> Result<Option<(u64, u32)>, KmtricksError> {
        if self.exhausted {
            return Ok(None);
        }
        let mut key_buf = [0u8; 8];
        match self.reader.read(&mut key_buf[..1]) {
            Ok(0) => {
                self.exhausted = true;
                return Ok(None);
            }
            Ok(_) => {
                self.reader
                    .read_exact(&mut key_buf[1..8])
                    .map_err(|e| KmtricksError::io(e, Path::new("<count file>")))?;
            }
            Err(e) => return Err(KmtricksError::io(e, Path::new("<count file>"))),
        }
        let key = u64::from_le_bytes(key_buf);
        let mut count_buf = [0u8; 4];
        self.reader
            .read_exact(&mut count_buf)
            .map_err(|e| KmtricksError::io(e, Path::new("<count file>")))?;
        Ok(Some((key, u32::from_le_bytes(count_buf))))
    }
}

/// Re-reads the header fields already consumed by [`KmerFileHeader::read`]
/// so the payload-reading [`BufReader`] is correctly positioned; this
/// mirrors the fixed-size prefix every `KmerFileHeader` serializes.
fn skip_header(
    reader: &mut BufReader<File>,
    header: &KmerFileHeader,
    path: &Path,
) -> Result<(), KmtricksError> {
    let prefix_len = 8 + 1 + 1 + 1 + 2 + header.sample_id.len() + 2 + 2 + 1 + 1 + 8;
    let mut discard = vec![0u8; prefix_len];
    reader
        .read_exact(&mut discard)
        .map_err(|e| KmtricksError::io(e, path))?;
    Ok(())
}

/// One merged row: the shared key, each sample's (possibly zeroed) count,
/// and whether the row passed the recurrence-min gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub key: u64,
    pub counts: Vec<u32>,
    pub keep: bool,
}

/// Drives the N-way merge across one partition's sample count files.
pub struct Merger {
    readers: Vec<Option<CountFileReader>>,
    current: Vec<Option<(u64, u32)>>,
    soft_min: SoftMinPolicy,
    recurrence_min: u32,
    share_min: u32,
    pub non_solid: Vec<u64>,
    pub saved: Vec<u64>,
}

impl Merger {
    /// Opens one count file reader per sample; a missing file (a sample
    /// with no k-mers in this partition) is treated as an immediately
    /// exhausted, all-zero stream rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Format`] if a present file has a malformed
    /// header, aborting the whole partition merge per component §5.
    pub fn open(
        partition_paths: &[Option<std::path::PathBuf>],
        soft_min: SoftMinPolicy,
        recurrence_min: u32,
        share_min: u32,
    ) -> Result<Self, KmtricksError> {
        let mut readers = Vec::with_capacity(partition_paths.len());
        let mut current = Vec::with_capacity(partition_paths.len());
        for path in partition_paths {
            match path {
                Some(p) => {
                    let (mut reader, _header) = CountFileReader::open(p)?;
                    let first = reader.read_next()?;
                    readers.push(Some(reader));
                    current.push(first);
                }
                None => {
                    readers.push(None);
                    current.push(None);
                }
            }
        }
        let n = readers.len();
        Ok(Self {
            readers,
            current,
            soft_min,
            recurrence_min,
            share_min,
            non_solid: vec![0u64; n],
            saved: vec![0u64; n],
        })
    }

    /// Advances to the next shared key across all streams and applies the
    /// solidity predicates, or returns `None` once every stream is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if a count file is truncated mid-record.
    pub fn next_row(&mut self) -> Result<Option<MergedRow>, KmtricksError> {
        let mut heap: BinaryHeap<Reverse<u64>> = BinaryHeap::new();
        for cur in &self.current {
            if let Some((key, _)) = cur {
                heap.push(Reverse(*key));
            }
        }
        let Some(Reverse(min_key)) = heap.pop() else {
            return Ok(None);
        };

        let n = self.current.len();
        let mut counts = vec![0u32; n];
        let mut rec = 0u32;
        let mut solid_in = 0u32;
        let mut needs_check = Vec::new();

        for i in 0..n {
            let at_min = matches!(self.current[i], Some((k, _)) if k == min_key);
            if at_min {
                let (_, count) = self.current[i].unwrap();
                counts[i] = count;
                let threshold = self.soft_min.threshold(i);
                if count >= threshold {
                    rec += 1;
                    solid_in += 1;
                } else {
                    self.non_solid[i] += 1;
                    if self.share_min > 0 {
                        needs_check.push(i);
                    } else {
                        counts[i] = 0;
                    }
                }
                self.current[i] = match &mut self.readers[i] {
                    Some(r) => r.read_next()?,
                    None => None,
                };
            }
        }

        for i in needs_check {
            if solid_in >= self.share_min {
                self.saved[i] += 1;
            } else {
                counts[i] = 0;
            }
        }

        let keep = rec >= self.recurrence_min;
        Ok(Some(MergedRow {
            key: min_key,
            counts,
            keep,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::{write_count_file, CountKeySpace, CountedKmer};
    use tempfile::tempdir;

    fn write_sample(dir: &Path, name: &str, entries: &[(u64, u32)]) -> std::path::PathBuf {
        let path = dir.join(name);
        let counted: Vec<CountedKmer> = entries
            .iter()
            .map(|&(key, count)| CountedKmer { key, count })
            .collect();
        write_count_file(&path, "s", 0, 21, CountKeySpace::Kmer, &counted).unwrap();
        path
    }

    #[test]
    fn merges_shared_keys_across_samples() {
        let dir = tempdir().unwrap();
        let a = write_sample(&dir.path(), "a.bin", &[(1, 5), (2, 3)]);
        let b = write_sample(&dir.path(), "b.bin", &[(1, 2), (3, 7)]);
        let mut merger = Merger::open(
            &[Some(a), Some(b)],
            SoftMinPolicy::Uniform(1),
            1,
            0,
        )
        .unwrap();

        let mut rows = Vec::new();
        while let Some(row) = merger.next_row().unwrap() {
            rows.push(row);
        }
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].key, 1);
        assert_eq!(rows[0].counts, vec![5, 2]);
    }

    #[test]
    fn soft_min_zeroes_weak_samples() {
        let dir = tempdir().unwrap();
        let a = write_sample(&dir.path(), "a.bin", &[(1, 1)]);
        let mut merger =
            Merger::open(&[Some(a)], SoftMinPolicy::Uniform(3), 1, 0).unwrap();
        let row = merger.next_row().unwrap().unwrap();
        assert_eq!(row.counts, vec![0]);
        assert!(!row.keep);
        assert_eq!(merger.non_solid, vec![1]);
    }

    #[test]
    fn recurrence_min_gates_keep_flag() {
        let dir = tempdir().unwrap();
        let a = write_sample(&dir.path(), "a.bin", &[(1, 5)]);
        let b = write_sample(&dir.path(), "b.bin", &[(1, 0)]);
        // b has no entries at all since count 0 would never be written by
        // the counter; simulate by omitting key 1 from b entirely.
        std::fs::remove_file(&b).ok();
        let b = write_sample(&dir.path(), "b.bin", &[(9, 1)]);
        let mut merger = Merger::open(
            &[Some(a), Some(b)],
            SoftMinPolicy::Uniform(1),
            2,
            0,
        )
        .unwrap();
        let row = merger.next_row().unwrap().unwrap();
        assert_eq!(row.key, 1);
        assert!(!row.keep); // only 1 sample solid, recurrence_min=2
    }

    #[test]
    fn share_min_rescues_weak_sample_when_others_are_solid() {
        let dir = tempdir().unwrap();
        let a = write_sample(&dir.path(), "a.bin", &[(1, 10)]);
        let b = write_sample(&dir.path(), "b.bin", &[(1, 1)]);
        let c = write_sample(&dir.path(), "c.bin", &[(1, 10)]);
        let mut merger = Merger::open(
            &[Some(a), Some(b), Some(c)],
            SoftMinPolicy::Uniform(5),
            1,
            2,
        )
        .unwrap();
        let row = merger.next_row().unwrap().unwrap();
        assert_eq!(row.counts[1], 1); // rescued, not zeroed
        assert_eq!(merger.saved, vec![0, 1, 0]);
    }

    #[test]
    fn missing_sample_file_is_treated_as_empty_stream() {
        let dir = tempdir().unwrap();
        let a = write_sample(&dir.path(), "a.bin", &[(1, 5)]);
        let mut merger =
            Merger::open(&[Some(a), None], SoftMinPolicy::Uniform(1), 1, 0).unwrap();
        let row = merger.next_row().unwrap().unwrap();
        assert_eq!(row.counts, vec![5, 0]);
    }
}
