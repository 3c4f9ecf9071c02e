//! Filter/intersection tool (component §6): restrict an already-built
//! matrix to the rows whose key also occurs in a new sample, reusing the
//! run's own repartition table and key space so partition numbering and
//! key encoding line up with the matrix being filtered.
//!
//! Only `count` and `pa` matrices are supported; the bloom-projected
//! formats (`bf`/`bft`/`bfc`) carry no per-row key to intersect against
//! once concatenated, so filtering them is rejected with
//! [`KmtricksError::Config`].

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::binformat::{CountMatrixHeader, KmerFileHeader, PaMatrixHeader};
use crate::config::{KeySpace, MatrixFormat};
use crate::counter::{count_partition, CountKeySpace, HashWindow};
use crate::error::KmtricksError;
use crate::format::SequenceFormat;
use crate::kmer::HashKind;
use crate::partitioner::emit_sample;
use crate::repartition::RepartitionTable;
use crate::rundir::{RunDir, RunManifest};
use crate::superkmer::PartitionWriter;

fn emit_sample_dispatch(
    path: &Path,
    format: SequenceFormat,
    k: usize,
    m: usize,
    table: &RepartitionTable,
    writers: &[PartitionWriter],
) -> Result<(), KmtricksError> {
    if k <= 32 {
        emit_sample::<u64>(path, format, k, m, table, table.freq_order(), writers)?;
    } else {
        emit_sample::<u128>(path, format, k, m, table, table.freq_order(), writers)?;
    }
    Ok(())
}

fn count_partition_dispatch(
    partition_path: &Path,
    k: usize,
    key_space: CountKeySpace,
    window: Option<HashWindow>,
) -> Result<HashSet<u64>, KmtricksError> {
    let entries = if k <= 32 {
        count_partition::<u64>(partition_path, k, key_space, 1, window, None)?
    } else {
        count_partition::<u128>(partition_path, k, key_space, 1, window, None)?
    };
    Ok(entries.into_iter().map(|c| c.key).collect())
}

/// Row and partition counts surfaced after a filter run.
#[derive(Debug, Clone, Default)]
pub struct FilterStats {
    pub rows_total: u64,
    pub rows_kept: u64,
}

/// Filters every partition of `run_dir`'s matrix against the k-mers found
/// in `sample_path`, writing the filtered partitions under `out_dir`.
///
/// # Errors
///
/// Returns [`KmtricksError::Config`] if the run's matrix format has no
/// per-row key (`bf`/`bft`/`bfc`), or any error the emission/counting/IO
/// steps it reuses can return.
pub fn filter_run_dir(
    run_dir: &RunDir,
    sample_path: &Path,
    sample_format: SequenceFormat,
    out_dir: &Path,
) -> Result<FilterStats, KmtricksError> {
    let manifest = RunManifest::read(&run_dir.manifest_path())?;
    let config = &manifest.config;

    if matches!(
        config.mode.matrix_format,
        MatrixFormat::Bf | MatrixFormat::Bft | MatrixFormat::Bfc
    ) {
        return Err(KmtricksError::Config {
            details: "filter does not support bloom-projected (bf/bft/bfc) matrices".to_string(),
        });
    }

    let table = RepartitionTable::load(&run_dir.repartition_table_path())?;
    std::fs::create_dir_all(out_dir).map_err(|e| KmtricksError::io(e, out_dir))?;

    let superk_paths: Vec<PathBuf> = (0..config.nb_partitions)
        .map(|p| out_dir.join(format!("filter_sample.{p}.superk")))
        .collect();
    let writers: Vec<PartitionWriter> = superk_paths
        .iter()
        .map(|p| PartitionWriter::create(p.clone()))
        .collect::<Result<_, _>>()?;
    emit_sample_dispatch(
        sample_path,
        sample_format,
        config.kmer_size,
        config.minimizer_size,
        &table,
        &writers,
    )?;
    for w in writers {
        w.close()?;
    }

    let key_space = match config.mode.key_space {
        KeySpace::Kmer => CountKeySpace::Kmer,
        KeySpace::Hash => CountKeySpace::Hash(HashKind::Fast),
    };

    let mut stats = FilterStats::default();
    let nb_samples = manifest.samples.len();

    let window_width = (config.bloom_size > 0)
        .then(|| (config.bloom_size as usize / config.nb_partitions.max(1) as usize).max(1));

    for (partition, superk_path) in (0..config.nb_partitions).zip(superk_paths.iter()) {
        let window = window_width.map(|w| HashWindow { w, partition });
        let keys = count_partition_dispatch(superk_path, config.kmer_size, key_space, window)?;
        std::fs::remove_file(superk_path).ok();

        let matrix_path = run_dir.matrix_path(partition);
        if !matrix_path.exists() {
            continue;
        }
        let out_path = out_dir.join(format!("{partition}.matrix"));

        match config.mode.matrix_format {
            MatrixFormat::Count => {
                let rows = read_count_matrix(&matrix_path, nb_samples)?;
                stats.rows_total += rows.len() as u64;
                let kept: Vec<(u64, Vec<u32>)> =
                    rows.into_iter().filter(|(k, _)| keys.contains(k)).collect();
                stats.rows_kept += kept.len() as u64;
                write_count_matrix(&out_path, partition, &kept)?;
            }
            MatrixFormat::Pa => {
                let (bits_in_use, rows) = read_pa_matrix(&matrix_path)?;
                stats.rows_total += rows.len() as u64;
                let kept: Vec<(u64, Vec<bool>)> =
                    rows.into_iter().filter(|(k, _)| keys.contains(k)).collect();
                stats.rows_kept += kept.len() as u64;
                write_pa_matrix(&out_path, partition, bits_in_use as usize, &kept)?;
            }
            MatrixFormat::Bf | MatrixFormat::Bft | MatrixFormat::Bfc => unreachable!(),
        }
    }

    Ok(stats)
}

pub fn read_count_matrix(path: &Path, nb_samples: usize) -> Result<Vec<(u64, Vec<u32>)>, KmtricksError> {
    let header = CountMatrixHeader::read(path)?;
    let row_len = 8 + 4 * nb_samples;
    let mut file = std::fs::File::open(path).map_err(|e| KmtricksError::io(e, path))?;
    let header_len = header_byte_len(&header);
    let mut skip = vec![0u8; header_len];
    file.read_exact(&mut skip).map_err(|e| KmtricksError::io(e, path))?;

    let mut rows = Vec::with_capacity(header.nb_counts as usize);
    let mut buf = vec![0u8; row_len];
    for _ in 0..header.nb_counts {
        file.read_exact(&mut buf).map_err(|e| KmtricksError::io(e, path))?;
        let key = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let counts = buf[8..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        rows.push((key, counts));
    }
    Ok(rows)
}

fn header_byte_len(header: &CountMatrixHeader) -> usize {
    8 + 1 + 1 + 1 + 2 + header.base.sample_id.len() + 2 + 2 + 1 + 1 + 1 + 8 + 8
}

fn write_count_matrix(path: &Path, partition: u16, rows: &[(u64, Vec<u32>)]) -> Result<(), KmtricksError> {
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
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| KmtricksError::io(e, path))?;
    for (key, counts) in rows {
        f.write_all(&key.to_le_bytes()).map_err(|e| KmtricksError::io(e, path))?;
        for c in counts {
            f.write_all(&c.to_le_bytes()).map_err(|e| KmtricksError::io(e, path))?;
        }
    }
    Ok(())
}

pub fn read_pa_matrix(path: &Path) -> Result<(u32, Vec<(u64, Vec<bool>)>), KmtricksError> {
    let header = PaMatrixHeader::read(path)?;
    let mut file = std::fs::File::open(path).map_err(|e| KmtricksError::io(e, path))?;
    let mut skip = vec![0u8; 8 + 1 + 2 + 4 + 4 + 8];
    file.read_exact(&mut skip).map_err(|e| KmtricksError::io(e, path))?;

    let row_bytes = header.row_bytes as usize;
    let bits_in_use = header.bits_in_use as usize;
    let mut rows = Vec::new();
    let mut buf = vec![0u8; row_bytes];
    let mut next_key = 0u64;
    loop {
        match file.read(&mut buf[..1]) {
            Ok(0) => break,
            Ok(_) => {
                file.read_exact(&mut buf[1..])
                    .map_err(|e| KmtricksError::io(e, path))?;
            }
            Err(e) => return Err(KmtricksError::io(e, path)),
        }
        let bits = (0..bits_in_use)
            .map(|i| buf[i / 8] & (1 << (i % 8)) != 0)
            .collect();
        rows.push((next_key, bits));
        next_key += 1;
    }
    Ok((header.bits_in_use, rows))
}

fn write_pa_matrix(
    path: &Path,
    partition: u16,
    nb_samples: usize,
    rows: &[(u64, Vec<bool>)],
) -> Result<(), KmtricksError> {
    let row_bytes = nb_samples.div_ceil(8) as u32;
    let header = PaMatrixHeader {
        partition_id: partition,
        bits_in_use: nb_samples as u32,
        row_bytes,
    };
    header.write(path)?;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| KmtricksError::io(e, path))?;
    for (_, row) in rows {
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
