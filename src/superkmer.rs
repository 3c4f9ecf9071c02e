//! Super-k-mer encoding and the partitioned append-only store (component
//! 4.2).
//!
//! A super-k-mer is a maximal run of consecutive k-mers sharing a
//! minimizer, stored as a 1-byte count of k-mers in the run followed by
//! `ceil((k + count - 1) / 4)` bytes of 2-bit-packed sequence of length
//! `k + count - 1`.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::KmtricksError;
use crate::kmer::{Base, Kmer, KmerWord};

/// One super-k-mer: the packed nucleotide run plus how many k-mers of
/// length `k` it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperKmer {
    pub count: u8,
    /// Packed bytes of the underlying nucleotide run, length
    /// `k + count - 1`, MSB-first 2-bit packing (byte 0 holds the leftmost
    /// bases).
    pub packed: Vec<u8>,
    pub run_len: usize,
}

impl SuperKmer {
    /// Encodes a run of `run_len` nucleotides (ASCII) containing `count`
    /// overlapping k-mers of length `k = run_len - count + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Input`] if `count` is 0 or exceeds 255, or
    /// if the sequence contains non-ACGT bytes.
    pub fn encode(seq: &[u8], count: u8) -> Result<Self, KmtricksError> {
        if count == 0 {
            return Err(KmtricksError::Input {
                details: "super-k-mer count must be >= 1".to_string(),
            });
        }
        let nbytes = seq.len().div_ceil(4);
        let mut packed = vec![0u8; nbytes];
        for (i, &byte) in seq.iter().enumerate() {
            let base = Base::try_from(byte)?;
            let byte_idx = i / 4;
            let shift = 6 - 2 * (i % 4);
            packed[byte_idx] |= base.code() << shift;
        }
        Ok(Self {
            count,
            packed,
            run_len: seq.len(),
        })
    }

    /// Decodes back to ASCII nucleotides.
    #[must_use]
    pub fn decode(&self) -> Vec<u8> {
        (0..self.run_len)
            .map(|i| {
                let byte_idx = i / 4;
                let shift = 6 - 2 * (i % 4);
                let code = (self.packed[byte_idx] >> shift) & 0b11;
                Base::from_code(code).to_ascii()
            })
            .collect()
    }

    /// Re-derives the `count` canonical-orientation k-mers of length `k`
    /// contained in this run (component 4.5's "reconstruct k-mers from
    /// super-k-mers").
    pub fn kmers<W: KmerWord>(&self, k: usize) -> Result<Vec<Kmer<W>>, KmtricksError> {
        let seq = self.decode();
        let mut out = Vec::with_capacity(self.count as usize);
        for start in 0..=(seq.len() - k) {
            out.push(Kmer::encode(&seq[start..start + k])?);
        }
        Ok(out)
    }

    fn write_to<Wt: Write>(&self, w: &mut Wt) -> std::io::Result<()> {
        w.write_all(&[self.count])?;
        w.write_all(&self.packed)
    }

    fn read_from<R: Read>(r: &mut R, k: usize) -> std::io::Result<Option<Self>> {
        let mut count_byte = [0u8; 1];
        match r.read(&mut count_byte)? {
            0 => return Ok(None),
            _ => {}
        }
        let count = count_byte[0];
        let run_len = k + count as usize - 1;
        let nbytes = run_len.div_ceil(4);
        let mut packed = vec![0u8; nbytes];
        r.read_exact(&mut packed)?;
        Ok(Some(Self {
            count,
            packed,
            run_len,
        }))
    }
}

/// One writer per (sample, partition): appends length-prefixed blocks to a
/// partition file. A block is a 4-byte little-endian length followed by
/// that many bytes of concatenated encoded super-k-mers.
pub struct PartitionWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl PartitionWriter {
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`] if the file cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, KmtricksError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .map_err(|e| KmtricksError::io(e, &path))?;
        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Writes one block containing `superkmers`. Holds the per-file lock
    /// only for the duration of this call; cross-partition writers never
    /// contend since each owns a distinct file.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write_block(&self, superkmers: &[SuperKmer]) -> Result<(), KmtricksError> {
        let mut buf = Vec::new();
        for sk in superkmers {
            sk.write_to(&mut buf)
                .map_err(|e| KmtricksError::io(e, &self.path))?;
        }
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .write_all(&(buf.len() as u32).to_le_bytes())
            .map_err(|e| KmtricksError::io(e, &self.path))?;
        guard
            .write_all(&buf)
            .map_err(|e| KmtricksError::io(e, &self.path))
    }

    /// Flushes and closes the file, marking it "written-closed" per the
    /// run directory lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`] if the final flush fails.
    pub fn close(self) -> Result<(), KmtricksError> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.flush().map_err(|e| KmtricksError::io(e, &self.path))
    }
}

/// Iterates the super-k-mers of a closed partition file, block by block.
pub struct PartitionReader {
    reader: BufReader<File>,
    k: usize,
    current_block: std::io::Cursor<Vec<u8>>,
    path: PathBuf,
}

impl PartitionReader {
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`] if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>, k: usize) -> Result<Self, KmtricksError> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| KmtricksError::io(e, &path))?;
        Ok(Self {
            reader: BufReader::new(file),
            k,
            current_block: std::io::Cursor::new(Vec::new()),
            path,
        })
    }

    fn load_next_block(&mut self) -> Result<bool, KmtricksError> {
        let mut len_bytes = [0u8; 4];
        match self.reader.read(&mut len_bytes[..1]) {
            Ok(0) => return Ok(false),
            Ok(_) => {
                self.reader
                    .read_exact(&mut len_bytes[1..])
                    .map_err(|e| KmtricksError::io(e, &self.path))?;
            }
            Err(e) => return Err(KmtricksError::io(e, &self.path)),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut buf = vec![0u8; len];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| KmtricksError::io(e, &self.path))?;
        self.current_block = std::io::Cursor::new(buf);
        Ok(true)
    }
}

impl Iterator for PartitionReader {
    type Item = Result<SuperKmer, KmtricksError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match SuperKmer::read_from(&mut self.current_block, self.k) {
                Ok(Some(sk)) => return Some(Ok(sk)),
                Ok(None) => match self.load_next_block() {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(KmtricksError::io(e, &self.path))),
            }
        }
    }
}

/// Compresses a block payload with a zstd frame when `--cpr` is enabled
/// (component 4.2's "optional frame-based compression").
///
/// # Errors
///
/// Returns [`KmtricksError::Io`] if the underlying zstd frame encoder
/// fails.
pub fn compress_block(payload: &[u8], level: i32) -> Result<Vec<u8>, KmtricksError> {
    zstd::encode_all(payload, level).map_err(|e| KmtricksError::io(e, Path::new("<zstd frame>")))
}

/// Decompresses one zstd frame written by [`compress_block`].
///
/// # Errors
///
/// Returns [`KmtricksError::Io`] if the frame is malformed.
pub fn decompress_block(frame: &[u8]) -> Result<Vec<u8>, KmtricksError> {
    zstd::decode_all(frame).map_err(|e| KmtricksError::io(e, Path::new("<zstd frame>")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn encode_decode_roundtrip() {
        let sk = SuperKmer::encode(b"ACGTACGT", 5).unwrap();
        assert_eq!(sk.decode(), b"ACGTACGT");
        assert_eq!(sk.run_len, 8);
    }

    #[test]
    fn packed_byte_length_matches_formula() {
        // k=5, count=4 -> run_len = 5+4-1=8 -> ceil(8/4)=2 bytes
        let sk = SuperKmer::encode(b"ACGTACGT", 4).unwrap();
        assert_eq!(sk.packed.len(), 2);
    }

    #[test]
    fn kmers_reconstructs_all_overlapping_kmers() {
        let sk = SuperKmer::encode(b"ACGTACGT", 4).unwrap();
        let kmers: Vec<Kmer<u64>> = sk.kmers(5).unwrap();
        assert_eq!(kmers.len(), 4);
        assert_eq!(kmers[0].decode(), b"ACGTA");
        assert_eq!(kmers[1].decode(), b"CGTAC");
        assert_eq!(kmers[2].decode(), b"GTACG");
        assert_eq!(kmers[3].decode(), b"TACGT");
    }

    #[test]
    fn writer_reader_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p0.bin");
        let writer = PartitionWriter::create(&path).unwrap();
        let sk1 = SuperKmer::encode(b"ACGTACGT", 4).unwrap();
        let sk2 = SuperKmer::encode(b"TTTTAAAA", 5).unwrap();
        writer.write_block(&[sk1.clone()]).unwrap();
        writer.write_block(&[sk2.clone()]).unwrap();
        writer.close().unwrap();

        let reader = PartitionReader::open(&path, 5).unwrap();
        let read: Vec<SuperKmer> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(read, vec![sk1, sk2]);
    }

    #[test]
    fn zstd_frame_roundtrip() {
        let payload = b"some super-k-mer block payload bytes".to_vec();
        let compressed = compress_block(&payload, 3).unwrap();
        let decompressed = decompress_block(&compressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn rejects_zero_count() {
        assert!(SuperKmer::encode(b"ACGT", 0).is_err());
    }
}
