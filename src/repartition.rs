//! The repartition table: minimizer -> partition id.
//!
//! A flat `Vec<u16>` of length `4^m`, written once by the `repart` stage
//! and read-only afterward. Layout is grounded on the original `RepartFile`
//! format (`libs/kmtricks/repartition.hpp`): header fields, the table
//! itself, then the magic number again at the tail, so truncation is
//! detectable without walking the whole file. A companion frequency-order
//! file is written alongside when minimizer-type is `Frequency`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::KmtricksError;
use crate::mmer::{FrequencyOrder, MinimizerType};

const MAGIC1: [u8; 8] = *b"KMTCREPT";
const MAGIC2: [u8; 8] = *b"TPERTCMK";

/// `{magic, P, m, mode}` header plus the flat table, per component 4.3.
#[derive(Debug, Clone)]
pub struct RepartitionTable {
    pub nb_partitions: u16,
    pub minimizer_size: usize,
    pub mode: MinimizerType,
    table: Vec<u16>,
    freq_order: Option<FrequencyOrder>,
}

impl RepartitionTable {
    /// Builds a table in lexicographic mode: contiguous ranges of m-mer
    /// values assigned to partitions so that cumulative weight (from
    /// `weights`, indexed by m-mer value) is balanced by count, not by raw
    /// value range.
    #[must_use]
    pub fn build_lexicographic(m: usize, nb_partitions: u16, weights: &[u64]) -> Self {
        let total: u64 = weights.iter().sum();
        let target_per_partition = total.max(1) / u64::from(nb_partitions).max(1);
        let mut table = vec![0u16; weights.len()];
        let mut acc = 0u64;
        let mut part = 0u16;
        for (v, &w) in weights.iter().enumerate() {
            table[v] = part;
            acc += w;
            if acc >= target_per_partition.max(1) && part + 1 < nb_partitions {
                acc = 0;
                part += 1;
            }
        }
        Self {
            nb_partitions,
            minimizer_size: m,
            mode: MinimizerType::Lexicographic,
            table,
            freq_order: None,
        }
    }

    /// Builds a table in frequency mode: rarer m-mers are spread across
    /// separate partitions first so the largest partition stays under the
    /// memory budget (component 4.3); `weights` drives the
    /// [`FrequencyOrder`].
    #[must_use]
    pub fn build_frequency(m: usize, nb_partitions: u16, weights: &[u64]) -> Self {
        let order = FrequencyOrder::from_counts(weights);
        let mut table = vec![0u16; weights.len()];
        for v in 0..weights.len() {
            let rank = order.rank_of(v as u32);
            table[v] = (rank % u32::from(nb_partitions)) as u16;
        }
        Self {
            nb_partitions,
            minimizer_size: m,
            mode: MinimizerType::Frequency,
            table,
            freq_order: Some(order),
        }
    }

    #[must_use]
    pub fn get(&self, minimizer_value: u32) -> u16 {
        self.table[minimizer_value as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[must_use]
    pub fn freq_order(&self) -> Option<&FrequencyOrder> {
        self.freq_order.as_ref()
    }

    /// Writes the table (and, in frequency mode, the companion order
    /// file) to `path`. Must be bit-stable across runs with identical
    /// configuration, so `repart-from` reuse is byte-exact.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write(&self, path: &Path) -> Result<(), KmtricksError> {
        let file = File::create(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut w = BufWriter::new(file);
        w.write_all(&MAGIC1).map_err(|e| KmtricksError::io(e, path))?;
        w.write_all(&self.nb_partitions.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
        w.write_all(&(self.table.len() as u64).to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
        w.write_all(&(self.minimizer_size as u16).to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
        let mode_byte: u8 = match self.mode {
            MinimizerType::Lexicographic => 0,
            MinimizerType::Frequency => 1,
        };
        w.write_all(&[mode_byte]).map_err(|e| KmtricksError::io(e, path))?;
        for &v in &self.table {
            w.write_all(&v.to_le_bytes())
                .map_err(|e| KmtricksError::io(e, path))?;
        }
        w.write_all(&[u8::from(self.freq_order.is_some())])
            .map_err(|e| KmtricksError::io(e, path))?;
        w.write_all(&MAGIC2).map_err(|e| KmtricksError::io(e, path))?;

        if let Some(order) = &self.freq_order {
            let freq_path = path.with_extension("freq");
            let ffile = File::create(&freq_path).map_err(|e| KmtricksError::io(e, &freq_path))?;
            let mut fw = BufWriter::new(ffile);
            for v in 0..self.table.len() as u32 {
                fw.write_all(&order.rank_of(v).to_le_bytes())
                    .map_err(|e| KmtricksError::io(e, &freq_path))?;
            }
            fw.write_all(&MAGIC2)
                .map_err(|e| KmtricksError::io(e, &freq_path))?;
        }
        Ok(())
    }

    /// Loads a table previously written by [`Self::write`].
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Format`] if either magic does not match,
    /// which also detects truncation (the tail magic would be missing or
    /// shifted).
    pub fn load(path: &Path) -> Result<Self, KmtricksError> {
        let file = File::open(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut r = BufReader::new(file);

        let mut magic1 = [0u8; 8];
        r.read_exact(&mut magic1).map_err(|e| KmtricksError::io(e, path))?;
        if magic1 != MAGIC1 {
            return Err(KmtricksError::format("bad magic-1", path));
        }

        let mut u16b = [0u8; 2];
        r.read_exact(&mut u16b).map_err(|e| KmtricksError::io(e, path))?;
        let nb_partitions = u16::from_le_bytes(u16b);

        let mut u64b = [0u8; 8];
        r.read_exact(&mut u64b).map_err(|e| KmtricksError::io(e, path))?;
        let nb_minims = u64::from_le_bytes(u64b) as usize;

        r.read_exact(&mut u16b).map_err(|e| KmtricksError::io(e, path))?;
        let minimizer_size = u16::from_le_bytes(u16b) as usize;

        let mut mode_byte = [0u8; 1];
        r.read_exact(&mut mode_byte).map_err(|e| KmtricksError::io(e, path))?;
        let mode = if mode_byte[0] == 0 {
            MinimizerType::Lexicographic
        } else {
            MinimizerType::Frequency
        };

        let mut table = vec![0u16; nb_minims];
        for slot in &mut table {
            r.read_exact(&mut u16b).map_err(|e| KmtricksError::io(e, path))?;
            *slot = u16::from_le_bytes(u16b);
        }

        let mut has_freq = [0u8; 1];
        r.read_exact(&mut has_freq).map_err(|e| KmtricksError::io(e, path))?;

        let mut magic2 = [0u8; 8];
        r.read_exact(&mut magic2).map_err(|e| KmtricksError::io(e, path))?;
        if magic2 != MAGIC2 {
            return Err(KmtricksError::format("bad magic-2 (truncated file?)", path));
        }

        let freq_order = if has_freq[0] != 0 {
            let freq_path = path.with_extension("freq");
            let ffile = File::open(&freq_path).map_err(|e| KmtricksError::io(e, &freq_path))?;
            let mut fr = BufReader::new(ffile);
            let mut rank = vec![0u32; nb_minims];
            let mut u32b = [0u8; 4];
            for slot in &mut rank {
                fr.read_exact(&mut u32b)
                    .map_err(|e| KmtricksError::io(e, &freq_path))?;
                *slot = u32::from_le_bytes(u32b);
            }
            let mut tail = [0u8; 8];
            fr.read_exact(&mut tail)
                .map_err(|e| KmtricksError::io(e, &freq_path))?;
            if tail != MAGIC2 {
                return Err(KmtricksError::format("bad magic-2 in freq file", &freq_path));
            }
            Some(FrequencyOrder::from_ranks(rank))
        } else {
            None
        };

        Ok(Self {
            nb_partitions,
            minimizer_size,
            mode,
            table,
            freq_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lexicographic_table_covers_all_partitions() {
        let weights: Vec<u64> = (0..256).map(|i| i as u64 + 1).collect();
        let table = RepartitionTable::build_lexicographic(4, 4, &weights);
        let used: std::collections::HashSet<u16> =
            (0..256u32).map(|v| table.get(v)).collect();
        assert!(used.len() <= 4);
        assert!(used.iter().all(|&p| p < 4));
    }

    #[test]
    fn round_trip_write_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repart.bin");
        let weights: Vec<u64> = (0..256).map(|i| i as u64 + 1).collect();
        let table = RepartitionTable::build_lexicographic(4, 4, &weights);
        table.write(&path).unwrap();
        let loaded = RepartitionTable::load(&path).unwrap();
        assert_eq!(loaded.nb_partitions, table.nb_partitions);
        assert_eq!(loaded.len(), table.len());
        for v in 0..256u32 {
            assert_eq!(loaded.get(v), table.get(v));
        }
    }

    #[test]
    fn frequency_round_trip_with_companion_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repart.bin");
        let weights: Vec<u64> = (0..256).map(|i| (256 - i) as u64).collect();
        let table = RepartitionTable::build_frequency(4, 4, &weights);
        table.write(&path).unwrap();
        let loaded = RepartitionTable::load(&path).unwrap();
        assert_eq!(loaded.mode, MinimizerType::Frequency);
        for v in 0..256u32 {
            assert_eq!(loaded.get(v), table.get(v));
        }
    }

    #[test]
    fn truncated_file_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repart.bin");
        let weights = vec![1u64; 256];
        let table = RepartitionTable::build_lexicographic(4, 4, &weights);
        table.write(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(RepartitionTable::load(&path).is_err());
    }

    #[test]
    fn repart_from_is_bit_stable() {
        let weights: Vec<u64> = (0..256).map(|i| i as u64 % 7 + 1).collect();
        let a = RepartitionTable::build_lexicographic(4, 8, &weights);
        let b = RepartitionTable::build_lexicographic(4, 8, &weights);
        for v in 0..256u32 {
            assert_eq!(a.get(v), b.get(v));
        }
    }
}
