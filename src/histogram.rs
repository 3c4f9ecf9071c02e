//! Per-sample k-mer abundance histograms (component §3, §5).
//!
//! `hist[i]` counts distinct k-mers appearing exactly `i` times for `i` in
//! `[lower, upper]`, with totals for unique counts and total occurrences
//! tracked separately below `lower` and above `upper`.

use crate::binformat::HistFileHeader;
use crate::error::KmtricksError;
use std::io::Read;
use std::path::Path;

/// A bounded abundance histogram for one sample, built incrementally as
/// the counter emits `(key, abundance)` pairs.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub lower: u32,
    pub upper: u32,
    /// `dense[i]` = number of distinct k-mers with abundance `lower + i`.
    dense: Vec<u64>,
    pub below_lower_uniq: u64,
    pub below_lower_occ: u64,
    pub above_upper_uniq: u64,
    pub above_upper_occ: u64,
}

impl Histogram {
    #[must_use]
    pub fn new(lower: u32, upper: u32) -> Self {
        let len = (upper - lower + 1) as usize;
        Self {
            lower,
            upper,
            dense: vec![0u64; len],
            below_lower_uniq: 0,
            below_lower_occ: 0,
            above_upper_uniq: 0,
            above_upper_occ: 0,
        }
    }

    /// Records one distinct k-mer observed with the given abundance.
    pub fn record(&mut self, abundance: u32) {
        if abundance < self.lower {
            self.below_lower_uniq += 1;
            self.below_lower_occ += u64::from(abundance);
        } else if abundance > self.upper {
            self.above_upper_uniq += 1;
            self.above_upper_occ += u64::from(abundance);
        } else {
            self.dense[(abundance - self.lower) as usize] += 1;
        }
    }

    #[must_use]
    pub fn get(&self, abundance: u32) -> u64 {
        if abundance < self.lower || abundance > self.upper {
            0
        } else {
            self.dense[(abundance - self.lower) as usize]
        }
    }

    #[must_use]
    pub fn uniq_total(&self) -> u64 {
        self.below_lower_uniq + self.above_upper_uniq + self.dense.iter().sum::<u64>()
    }

    #[must_use]
    pub fn occ_total(&self) -> u64 {
        let dense_occ: u64 = self
            .dense
            .iter()
            .enumerate()
            .map(|(i, &c)| c * u64::from(self.lower + i as u32))
            .sum();
        self.below_lower_occ + self.above_upper_occ + dense_occ
    }

    /// Merges another sample-partition histogram into this one. Per §5,
    /// per-partition histograms are accumulated by each counter worker and
    /// then merged serially once all partitions for a sample are done.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.lower, other.lower);
        debug_assert_eq!(self.upper, other.upper);
        for (a, b) in self.dense.iter_mut().zip(other.dense.iter()) {
            *a += b;
        }
        self.below_lower_uniq += other.below_lower_uniq;
        self.below_lower_occ += other.below_lower_occ;
        self.above_upper_uniq += other.above_upper_uniq;
        self.above_upper_occ += other.above_upper_occ;
    }

    /// Writes this histogram as a `HistFile` (§6).
    ///
    /// # Errors
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write(&self, path: &Path, sample_id: &str, k: u16) -> Result<(), KmtricksError> {
        let header = HistFileHeader {
            sample_id: sample_id.to_string(),
            k,
            lower: self.lower,
            upper: self.upper,
            uniq_total: self.uniq_total(),
            occ_total: self.occ_total(),
        };
        header.write(path)?;
        // oob + two dense arrays are appended after the fixed header.
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| KmtricksError::io(e, path))?;
        f.write_all(&self.below_lower_uniq.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
        f.write_all(&self.below_lower_occ.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
        f.write_all(&self.above_upper_uniq.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
        f.write_all(&self.above_upper_occ.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
        for &c in &self.dense {
            f.write_all(&c.to_le_bytes())
                .map_err(|e| KmtricksError::io(e, path))?;
        }
        Ok(())
    }

    /// Reads a histogram previously written by [`Self::write`]: the fixed
    /// [`HistFileHeader`] gives `lower`/`upper`, then the oob totals and
    /// dense array follow as raw bytes in the exact order `write` emits
    /// them, mirroring how [`crate::filter::read_count_matrix`] re-opens
    /// the file and skips the header rather than relying on the reader
    /// position left by `HistFileHeader::read`.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`]/[`KmtricksError::Format`] on a missing
    /// or truncated file.
    pub fn read(path: &Path) -> Result<Self, KmtricksError> {
        let header = HistFileHeader::read(path)?;
        let mut file = std::fs::File::open(path).map_err(|e| KmtricksError::io(e, path))?;
        let mut skip = vec![0u8; header_byte_len(&header)];
        file.read_exact(&mut skip).map_err(|e| KmtricksError::io(e, path))?;

        let mut buf = [0u8; 8];
        let mut next_u64 = |file: &mut std::fs::File| -> Result<u64, KmtricksError> {
            file.read_exact(&mut buf).map_err(|e| KmtricksError::io(e, path))?;
            Ok(u64::from_le_bytes(buf))
        };
        let below_lower_uniq = next_u64(&mut file)?;
        let below_lower_occ = next_u64(&mut file)?;
        let above_upper_uniq = next_u64(&mut file)?;
        let above_upper_occ = next_u64(&mut file)?;

        let len = (header.upper - header.lower + 1) as usize;
        let mut dense = Vec::with_capacity(len);
        for _ in 0..len {
            dense.push(next_u64(&mut file)?);
        }

        Ok(Self {
            lower: header.lower,
            upper: header.upper,
            dense,
            below_lower_uniq,
            below_lower_occ,
            above_upper_uniq,
            above_upper_occ,
        })
    }

    /// The smallest abundance `a` such that the cumulative unique-k-mer
    /// mass below `a` is >= `quantile` (a fraction in `[0,1]`). Used by
    /// soft-min autocompute (component 4.6).
    #[must_use]
    pub fn quantile(&self, quantile: f64) -> u32 {
        let total = self.uniq_total().max(1) as f64;
        let target = quantile * total;
        let mut cumulative = self.below_lower_uniq as f64;
        if cumulative >= target {
            return 0;
        }
        for (i, &c) in self.dense.iter().enumerate() {
            cumulative += c as f64;
            if cumulative >= target {
                return self.lower + i as u32;
            }
        }
        self.upper
    }
}

fn header_byte_len(header: &HistFileHeader) -> usize {
    8 + 1 + 2 + header.sample_id.len() + 2 + 4 + 4 + 8 + 8 + 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn record_and_get() {
        let mut h = Histogram::new(1, 100);
        h.record(5);
        h.record(5);
        h.record(10);
        assert_eq!(h.get(5), 2);
        assert_eq!(h.get(10), 1);
        assert_eq!(h.get(11), 0);
    }

    #[test]
    fn out_of_band_totals() {
        let mut h = Histogram::new(2, 50);
        h.record(1); // below lower
        h.record(100); // above upper
        assert_eq!(h.below_lower_uniq, 1);
        assert_eq!(h.above_upper_uniq, 1);
        assert_eq!(h.uniq_total(), 2);
    }

    #[test]
    fn hard_min_leaves_hist_1_at_zero() {
        // scenario 2: hard-min=2 means count==1 never reaches the histogram.
        let mut h = Histogram::new(1, 100);
        for count in [2, 2, 3, 5] {
            h.record(count);
        }
        assert_eq!(h.get(1), 0);
        let rows_ge_2: u64 = (2..=100).map(|i| h.get(i)).sum();
        assert_eq!(rows_ge_2, 4);
    }

    #[test]
    fn merge_sums_dense_and_oob() {
        let mut a = Histogram::new(1, 10);
        a.record(3);
        let mut b = Histogram::new(1, 10);
        b.record(3);
        b.record(20);
        a.merge(&b);
        assert_eq!(a.get(3), 2);
        assert_eq!(a.above_upper_uniq, 1);
    }

    #[test]
    fn quantile_50th_percentile() {
        let mut h = Histogram::new(1, 10);
        for _ in 0..5 {
            h.record(1);
        }
        for _ in 0..5 {
            h.record(9);
        }
        let q = h.quantile(0.5);
        assert!(q == 1 || q == 9);
    }

    #[test]
    fn write_round_trips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.bin");
        let mut h = Histogram::new(1, 10);
        h.record(3);
        h.write(&path, "sample_A", 21).unwrap();
        let header = HistFileHeader::read(&path).unwrap();
        assert_eq!(header.sample_id, "sample_A");
        assert_eq!(header.uniq_total, 1);
    }

    #[test]
    fn read_round_trips_full_histogram() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.bin");
        let mut h = Histogram::new(1, 10);
        h.record(0); // below lower
        h.record(3);
        h.record(3);
        h.record(20); // above upper
        h.write(&path, "sample_B", 21).unwrap();

        let read_back = Histogram::read(&path).unwrap();
        assert_eq!(read_back.lower, 1);
        assert_eq!(read_back.upper, 10);
        assert_eq!(read_back.get(3), 2);
        assert_eq!(read_back.below_lower_uniq, 1);
        assert_eq!(read_back.above_upper_uniq, 1);
        assert_eq!(read_back.uniq_total(), h.uniq_total());
        assert_eq!(read_back.quantile(0.5), h.quantile(0.5));
    }
}
