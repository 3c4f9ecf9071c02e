//! Glues the scheduler and every stage component together into the
//! `pipeline` subcommand (component §4.8/§9), fluent-builder style
//! grounded on the teacher's `builder.rs`.

use std::path::PathBuf;

use crate::binformat::{
    BitMatrixHeader, BitVectorHeader, CountMatrixHeader, KmerFileHeader, PaMatrixHeader,
};
use crate::bloom::{build_partition_vector, bloom_position, transpose_bit_matrix, CountingBloom};
use crate::config::{RunConfig, SoftMin};
use crate::counter::{count_partition, write_count_file, CountKeySpace, CountedKmer, HashWindow};
use crate::error::KmtricksError;
use crate::fof::Fof;
use crate::format::SequenceFormat;
use crate::histogram::Histogram;
use crate::kmer::HashKind;
use crate::merger::{MergedRow, Merger, SoftMinPolicy};
use crate::mmer::{FrequencyOrder, MinimizerType};
use crate::partitioner::{emit_sample, sample_mmer_frequencies};
use crate::repartition::RepartitionTable;
use crate::rundir::{RunDir, RunManifest};
use crate::scheduler::Scheduler;
use crate::signals::CancellationToken;
use crate::superkmer::PartitionWriter;

/// Dispatches on k to pick the `u64`/`u128`-backed `KmerWord` at the one
/// spot each stage needs it, mirroring `kmer::K_MAX`'s 32-base cutover.
pub fn emit_sample_dispatch(
    path: &std::path::Path,
    format: SequenceFormat,
    k: usize,
    m: usize,
    table: &RepartitionTable,
    freq: Option<&FrequencyOrder>,
    writers: &[PartitionWriter],
) -> Result<crate::partitioner::PartitionStats, KmtricksError> {
    if k <= 32 {
        emit_sample::<u64>(path, format, k, m, table, freq, writers)
    } else {
        emit_sample::<u128>(path, format, k, m, table, freq, writers)
    }
}

pub fn count_partition_dispatch(
    partition_path: &std::path::Path,
    k: usize,
    key_space: CountKeySpace,
    hard_min: u32,
    window: Option<HashWindow>,
    histogram: Option<&mut Histogram>,
) -> Result<Vec<CountedKmer>, KmtricksError> {
    if k <= 32 {
        count_partition::<u64>(partition_path, k, key_space, hard_min, window, histogram)
    } else {
        count_partition::<u128>(partition_path, k, key_space, hard_min, window, histogram)
    }
}

/// The hash-mode partition window for `(p, P)` given the run's configured
/// `bloom_size`, or `None` when bloom-size is unset (un-windowed hashing).
fn hash_window(config: &RunConfig, partition: u16) -> Option<HashWindow> {
    (config.bloom_size > 0).then(|| HashWindow {
        w: (config.bloom_size as usize / config.nb_partitions.max(1) as usize).max(1),
        partition,
    })
}

/// Per-run fluent configuration for driving every stage end to end.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: RunConfig,
    run_dir: RunDir,
    fof: Fof,
    input_format: SequenceFormat,
    workers: usize,
    queue_capacity: usize,
    mmer_sample_reads: usize,
    cancel: Option<CancellationToken>,
}

/// Totals surfaced after a full run, for the `infos` subcommand.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub samples: Vec<String>,
    pub nb_partitions: u16,
    pub kmers_emitted: u64,
    pub rows_kept: u64,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: RunConfig, run_dir: RunDir, fof: Fof) -> Self {
        Self {
            config,
            run_dir,
            fof,
            input_format: SequenceFormat::Auto,
            workers: std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get),
            queue_capacity: 256,
            mmer_sample_reads: 10_000,
            cancel: None,
        }
    }

    /// Supplies an external cancellation token (e.g. wired to a SIGINT
    /// handler) instead of the run-local one `run` would otherwise create.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn input_format(mut self, format: SequenceFormat) -> Self {
        self.input_format = format;
        self
    }

    #[must_use]
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }

    #[must_use]
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n.max(1);
        self
    }

    /// Runs every stage in order: repartition, super-k-mer emission,
    /// counting, merging, and matrix formatting.
    ///
    /// # Errors
    ///
    /// Returns the first error surfaced by any stage, or
    /// [`KmtricksError::Pipeline`] joining every per-task failure collected
    /// at a level fence.
    pub fn run(&self) -> Result<RunSummary, KmtricksError> {
        self.run_dir.init()?;
        RunManifest::new(self.config.clone(), &self.fof).write(&self.run_dir.manifest_path())?;

        let cancel = self.cancel.clone().unwrap_or_default();
        let scheduler = Scheduler::new(self.workers, self.queue_capacity, cancel.clone());

        let table = self.build_repartition_table()?;
        table.write(&self.run_dir.repartition_table_path())?;

        self.run_superk_stage(&scheduler, &table)?;
        self.run_count_stage(&scheduler, &table)?;
        let merged = self.run_merge_stage(&scheduler)?;
        let rows_kept = self.run_format_stage(&scheduler, merged)?;

        let errors = scheduler.errors();
        if !errors.is_empty() {
            let details = errors
                .iter()
                .map(|(label, e)| format!("{label}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(KmtricksError::Pipeline { details });
        }

        Ok(RunSummary {
            samples: self.fof.samples.iter().map(|s| s.id.clone()).collect(),
            nb_partitions: self.config.nb_partitions,
            kmers_emitted: 0,
            rows_kept,
        })
    }

    fn build_repartition_table(&self) -> Result<RepartitionTable, KmtricksError> {
        let m = self.config.minimizer_size;
        let mut weights = vec![0u64; 1usize << (2 * m)];
        for sample in &self.fof.samples {
            for file in &sample.files {
                let counts = sample_mmer_frequencies(
                    file,
                    self.input_format,
                    self.config.kmer_size,
                    m,
                    self.mmer_sample_reads,
                )?;
                for (w, c) in weights.iter_mut().zip(counts.iter()) {
                    *w += c;
                }
            }
        }
        Ok(match self.config.minimizer_type {
            MinimizerType::Lexicographic => {
                RepartitionTable::build_lexicographic(m, self.config.nb_partitions, &weights)
            }
            MinimizerType::Frequency => {
                RepartitionTable::build_frequency(m, self.config.nb_partitions, &weights)
            }
        })
    }

    fn run_superk_stage(
        &self,
        scheduler: &Scheduler,
        table: &RepartitionTable,
    ) -> Result<(), KmtricksError> {
        let tasks: Vec<_> = self
            .fof
            .samples
            .iter()
            .map(|sample| {
                let sample = sample.clone();
                let config = self.config.clone();
                let run_dir = self.run_dir.clone();
                let format = self.input_format;
                let freq = table.freq_order().cloned();
                let table = table.clone();
                move || -> Result<(), KmtricksError> {
                    let writers: Vec<PartitionWriter> = (0..config.nb_partitions)
                        .map(|p| PartitionWriter::create(run_dir.superk_path(&sample.id, p)))
                        .collect::<Result<_, _>>()?;
                    for file in &sample.files {
                        emit_sample_dispatch(
                            file,
                            format,
                            config.kmer_size,
                            config.minimizer_size,
                            &table,
                            freq.as_ref(),
                            &writers,
                        )?;
                    }
                    for w in writers {
                        w.close()?;
                    }
                    Ok(())
                }
            })
            .collect();
        scheduler.run_level("superk", tasks);
        Ok(())
    }

    fn run_count_stage(
        &self,
        scheduler: &Scheduler,
        table: &RepartitionTable,
    ) -> Result<(), KmtricksError> {
        let key_space = match self.config.mode.key_space {
            crate::config::KeySpace::Kmer => CountKeySpace::Kmer,
            crate::config::KeySpace::Hash => CountKeySpace::Hash(HashKind::Fast),
        };
        // Per-sample histograms are accumulated across every partition's
        // count task before being written once, since each count task only
        // sees its own partition's k-mers.
        let histograms: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<String, Histogram>>> =
            std::sync::Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));

        let mut tasks = Vec::new();
        for sample in &self.fof.samples {
            for partition in 0..self.config.nb_partitions {
                let sample_id = sample.id.clone();
                let config = self.config.clone();
                let run_dir = self.run_dir.clone();
                let histograms = std::sync::Arc::clone(&histograms);
                let _ = table;
                tasks.push(move || -> Result<(), KmtricksError> {
                    let superk_path = run_dir.superk_path(&sample_id, partition);
                    let needs_hist =
                        config.hist || matches!(config.soft_min, SoftMin::Quantile(_));
                    let mut hist = needs_hist.then(|| Histogram::new(1, 1_000_000));
                    let window = hash_window(&config, partition);
                    let counted = count_partition_dispatch(
                        &superk_path,
                        config.kmer_size,
                        key_space,
                        config.hard_min,
                        window,
                        hist.as_mut(),
                    )?;
                    write_count_file(
                        &run_dir.count_path(&sample_id, partition),
                        &sample_id,
                        partition,
                        config.kmer_size as u16,
                        key_space,
                        &counted,
                    )?;
                    if let Some(hist) = hist {
                        let mut guard = histograms
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        guard
                            .entry(sample_id.clone())
                            .and_modify(|existing| existing.merge(&hist))
                            .or_insert(hist);
                    }
                    Ok(())
                });
            }
        }
        scheduler.run_level("count", tasks);

        if self.config.hist || matches!(self.config.soft_min, SoftMin::Quantile(_)) {
            let guard = histograms
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for (sample_id, hist) in guard.iter() {
                hist.write(
                    &self.run_dir.histogram_path(sample_id),
                    sample_id,
                    self.config.kmer_size as u16,
                )?;
            }
        }
        Ok(())
    }

    /// Resolves `--soft-min` into a concrete per-sample policy: `Quantile`
    /// reads each sample's histogram (written by `run_count_stage` whenever
    /// soft-min needs one) and finds its `q`-th percentile abundance;
    /// `PerSample` parses one integer threshold per line, in fof
    /// declaration order, per component §4.6.
    fn resolve_soft_min(&self) -> Result<SoftMinPolicy, KmtricksError> {
        match &self.config.soft_min {
            SoftMin::Uniform(t) => Ok(SoftMinPolicy::Uniform(*t)),
            SoftMin::Quantile(q) => {
                let mut thresholds = Vec::with_capacity(self.fof.samples.len());
                for sample in &self.fof.samples {
                    let hist = Histogram::read(&self.run_dir.histogram_path(&sample.id))?;
                    thresholds.push(hist.quantile(*q));
                }
                Ok(SoftMinPolicy::PerSample(thresholds))
            }
            SoftMin::PerSample(path) => {
                Ok(SoftMinPolicy::PerSample(read_per_sample_thresholds(
                    path,
                    self.fof.samples.len(),
                )?))
            }
        }
    }

    /// Merges every partition's per-sample count files (level 4, §4.8):
    /// one `Merge(p)` task per partition, submitted to the scheduler behind
    /// the `Count` fence so every sample's partition `p` is complete before
    /// it runs.
    fn run_merge_stage(
        &self,
        scheduler: &Scheduler,
    ) -> Result<std::collections::HashMap<u16, Vec<MergedRow>>, KmtricksError> {
        let soft_min = self.resolve_soft_min()?;
        let merged: std::sync::Arc<
            std::sync::Mutex<std::collections::HashMap<u16, Vec<MergedRow>>>,
        > = std::sync::Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));

        let mut tasks = Vec::new();
        for partition in 0..self.config.nb_partitions {
            let paths: Vec<Option<PathBuf>> = self
                .fof
                .samples
                .iter()
                .map(|s| {
                    let p = self.run_dir.count_path(&s.id, partition);
                    p.exists().then_some(p)
                })
                .collect();
            let soft_min = soft_min.clone();
            let recurrence_min = self.config.recurrence_min;
            let share_min = self.config.share_min;
            let merged = std::sync::Arc::clone(&merged);
            tasks.push(move || -> Result<(), KmtricksError> {
                let mut merger = Merger::open(&paths, soft_min, recurrence_min, share_min)?;
                let mut rows = Vec::new();
                while let Some(row) = merger.next_row()? {
                    if row.keep {
                        rows.push(row);
                    }
                }
                merged
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .insert(partition, rows);
                Ok(())
            });
        }
        scheduler.run_level("merge", tasks);

        Ok(std::sync::Arc::try_unwrap(merged)
            .map_err(|_| KmtricksError::Pipeline {
                details: "merge stage: result map still shared after the level fence".to_string(),
            })?
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    /// Writes each partition's matrix file from its merged rows (level 5,
    /// §4.8/§4.9), one `Format(p)` task per partition, dispatched by
    /// `--mode`'s matrix format.
    fn run_format_stage(
        &self,
        scheduler: &Scheduler,
        merged: std::collections::HashMap<u16, Vec<MergedRow>>,
    ) -> Result<u64, KmtricksError> {
        let nb_samples = self.fof.samples.len();
        let rows_kept = merged.values().map(|rows| rows.len() as u64).sum();
        let w = (self.config.bloom_size as usize / self.config.nb_partitions.max(1) as usize).max(1);
        let sample_ids: Vec<String> = self.fof.samples.iter().map(|s| s.id.clone()).collect();

        let mut tasks = Vec::new();
        for (partition, rows) in merged {
            let run_dir = self.run_dir.clone();
            let matrix_format = self.config.mode.matrix_format;
            let bitw = self.config.bitw.max(1);
            let sample_ids = sample_ids.clone();
            tasks.push(move || -> Result<(), KmtricksError> {
                match matrix_format {
                    crate::config::MatrixFormat::Count => {
                        let count_rows: Vec<(u64, Vec<u32>)> =
                            rows.iter().map(|r| (r.key, r.counts.clone())).collect();
                        write_count_matrix(&run_dir.matrix_path(partition), partition, &count_rows)?;
                    }
                    crate::config::MatrixFormat::Pa => {
                        let pa_rows: Vec<Vec<bool>> = rows
                            .iter()
                            .map(|r| r.counts.iter().map(|&c| c > 0).collect())
                            .collect();
                        write_pa_matrix(
                            &run_dir.matrix_path(partition),
                            partition,
                            nb_samples,
                            &pa_rows,
                        )?;
                    }
                    crate::config::MatrixFormat::Bf => {
                        write_bf_matrix(&run_dir, partition, &sample_ids, &rows, w)?;
                    }
                    crate::config::MatrixFormat::Bft => {
                        write_bft_matrix(&run_dir, partition, nb_samples, &rows, w)?;
                    }
                    crate::config::MatrixFormat::Bfc => {
                        write_bfc_matrix(&run_dir, partition, &sample_ids, &rows, w, bitw)?;
                    }
                }
                Ok(())
            });
        }
        scheduler.run_level("format", tasks);
        Ok(rows_kept)
    }
}

/// Writes one sample's dense `w`-wide `bf` Bloom window for a partition: bit
/// `i` set iff some kept k-mer solid in this sample hashed to local offset
/// `i`.
pub fn write_bf_matrix(
    run_dir: &RunDir,
    partition: u16,
    sample_ids: &[String],
    rows: &[MergedRow],
    w: usize,
) -> Result<(), KmtricksError> {
    for (i, sample_id) in sample_ids.iter().enumerate() {
        let hashes = rows.iter().filter(|r| r.counts[i] > 0).map(|r| r.key);
        let vector = build_partition_vector(hashes, w);
        write_bit_vector(&run_dir.bloom_path(sample_id, partition), partition, &vector)?;
    }
    Ok(())
}

fn write_bit_vector(
    path: &std::path::Path,
    partition: u16,
    vector: &crate::bloom::BitVector,
) -> Result<(), KmtricksError> {
    let header = BitVectorHeader {
        partition_id: partition,
        bytes: vector.as_bytes().len() as u32,
        nb_bits: vector.len() as u64,
        compressed: false,
    };
    header.write(path)?;
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| KmtricksError::io(e, path))?;
    f.write_all(vector.as_bytes())
        .map_err(|e| KmtricksError::io(e, path))
}

/// Builds the `w x N` (bloom position x sample) presence matrix for one
/// partition, then transposes it to `N x w` for storage, so later per-sample
/// reads don't have to stride across every other sample's bits.
pub fn write_bft_matrix(
    run_dir: &RunDir,
    partition: u16,
    nb_samples: usize,
    rows: &[MergedRow],
    w: usize,
) -> Result<(), KmtricksError> {
    let w_padded = w.next_multiple_of(8).max(8);
    let n_padded = nb_samples.next_multiple_of(8).max(8);
    let src_row_bytes = n_padded / 8;
    let mut data = vec![0u8; w_padded * src_row_bytes];
    for row in rows {
        let pos = bloom_position(row.key, w);
        for (i, &count) in row.counts.iter().enumerate() {
            if count > 0 {
                data[pos * src_row_bytes + i / 8] |= 1 << (i % 8);
            }
        }
    }
    let transposed = transpose_bit_matrix(&data, w_padded, n_padded);

    let path = run_dir.matrix_path(partition);
    let header = BitMatrixHeader {
        matrix_type: 0,
        partition_id: partition,
        nb_rows_padded: n_padded as u32,
        nb_cols_padded: w_padded as u32,
        row_bytes: (w_padded / 8) as u32,
        compressed: false,
    };
    header.write(&path)?;
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .map_err(|e| KmtricksError::io(e, &path))?;
    f.write_all(&transposed).map_err(|e| KmtricksError::io(e, &path))
}

/// Writes one sample's fixed-bit-width counting Bloom filter for a
/// partition. `matrix_type` doubles as the stored bit width since
/// `BitMatrixHeader` has no dedicated field for it and this file holds one
/// sample's cell array rather than a true matrix (`nb_rows_padded` is `1`).
pub fn write_bfc_matrix(
    run_dir: &RunDir,
    partition: u16,
    sample_ids: &[String],
    rows: &[MergedRow],
    w: usize,
    bitw: u8,
) -> Result<(), KmtricksError> {
    for (i, sample_id) in sample_ids.iter().enumerate() {
        let mut cb = CountingBloom::new(w, bitw);
        for row in rows {
            if row.counts[i] > 0 {
                cb.increment(bloom_position(row.key, w));
            }
        }
        let path = run_dir.bloom_counting_path(sample_id, partition);
        let header = BitMatrixHeader {
            matrix_type: bitw,
            partition_id: partition,
            nb_rows_padded: 1,
            nb_cols_padded: cb.nb_cells() as u32,
            row_bytes: cb.as_bytes().len() as u32,
            compressed: false,
        };
        header.write(&path)?;
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| KmtricksError::io(e, &path))?;
        f.write_all(cb.as_bytes())
            .map_err(|e| KmtricksError::io(e, &path))?;
    }
    Ok(())
}

/// Parses a `--soft-min` vector file (one integer threshold per line, in fof
/// declaration order, per component §4.6).
pub fn read_per_sample_thresholds(
    path: &std::path::Path,
    nb_samples: usize,
) -> Result<Vec<u32>, KmtricksError> {
    let text = std::fs::read_to_string(path).map_err(|e| KmtricksError::io(e, path))?;
    let thresholds: Vec<u32> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            l.parse::<u32>().map_err(|_| KmtricksError::Input {
                details: format!("soft-min file {}: invalid integer '{l}'", path.display()),
            })
        })
        .collect::<Result<_, _>>()?;
    if thresholds.len() != nb_samples {
        return Err(KmtricksError::Input {
            details: format!(
                "soft-min file {} has {} threshold(s), expected one per sample ({nb_samples})",
                path.display(),
                thresholds.len()
            ),
        });
    }
    Ok(thresholds)
}

pub fn write_count_matrix(
    path: &std::path::Path,
    partition: u16,
    rows: &[(u64, Vec<u32>)],
) -> Result<(), KmtricksError> {
    let header = CountMatrixHeader {
        base: KmerFileHeader {
            key_width: 8,
            count_width: 4,
            sample_id: String::new(),
            partition_id: partition,
            k: 0,
            is_compressed: false,
            is_hashes: false,
        },
        matrix_type: 0,
        nb_counts: rows.len() as u64,
    };
    header.write(path)?;
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| KmtricksError::io(e, path))?;
    for (key, counts) in rows {
        f.write_all(&key.to_le_bytes())
            .map_err(|e| KmtricksError::io(e, path))?;
        for c in counts {
            f.write_all(&c.to_le_bytes())
                .map_err(|e| KmtricksError::io(e, path))?;
        }
    }
    Ok(())
}

pub fn write_pa_matrix(
    path: &std::path::Path,
    partition: u16,
    nb_samples: usize,
    rows: &[Vec<bool>],
) -> Result<(), KmtricksError> {
    let row_bytes = nb_samples.div_ceil(8) as u32;
    let header = PaMatrixHeader {
        partition_id: partition,
        bits_in_use: nb_samples as u32,
        row_bytes,
    };
    header.write(path)?;
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| KmtricksError::io(e, path))?;
    for row in rows {
        let mut packed = vec![0u8; row_bytes as usize];
        for (i, &bit) in row.iter().enumerate() {
            if bit {
                packed[i / 8] |= 1 << (i % 8);
            }
        }
        f.write_all(&packed).map_err(|e| KmtricksError::io(e, path))?;
    }
    Ok(())
}
