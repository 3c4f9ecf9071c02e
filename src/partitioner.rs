//! Super-k-mer emission (component §4.4): for one sample, walk every read,
//! split at ambiguous bases, slide the k-mer window, select each window's
//! minimizer, and group consecutive windows sharing a minimizer into a
//! super-k-mer routed to that minimizer's partition.

use std::path::Path;

use bio::io::{fasta, fastq};

use crate::error::KmtricksError;
use crate::format::SequenceFormat;
use crate::kmer::{split_at_ambiguous, Kmer, KmerWord};
use crate::mmer::{decode_mmer, select_minimizer, FrequencyOrder, MinimizerType};
use crate::repartition::RepartitionTable;
use crate::superkmer::{PartitionWriter, SuperKmer};

/// Per-sample emission statistics, surfaced to `infos`.
#[derive(Debug, Clone, Default)]
pub struct PartitionStats {
    pub reads_processed: u64,
    pub bases_processed: u64,
    pub superkmers_emitted: u64,
    pub kmers_emitted: u64,
}

/// Picks the minimizer-bearing partition for one window, given its
/// canonical k-mer, by extracting every candidate m-mer and its reverse
/// complement and routing through [`select_minimizer`].
fn minimizer_partition_key<W: KmerWord>(
    window: Kmer<W>,
    m: usize,
    minimizer_type: MinimizerType,
    freq: Option<&FrequencyOrder>,
) -> u32 {
    let k = window.k();
    let rc = window.reverse_complement();
    let (_, raw_val) = select_minimizer(k, m, |offset| {
        let fwd = window.extract_mmer(offset, m);
        let rc_off = k - m - offset;
        let rc_val = rc.extract_mmer(rc_off, m);
        (fwd, rc_val)
    });
    match (minimizer_type, freq) {
        (MinimizerType::Frequency, Some(order)) => order.rank_of(raw_val),
        _ => raw_val,
    }
}

/// Emits super-k-mers for one sample's read file(s) into per-partition
/// writers. `writers` must have one entry per partition, index = partition
/// id.
pub fn emit_sample<W: KmerWord>(
    path: &Path,
    format: SequenceFormat,
    k: usize,
    m: usize,
    table: &RepartitionTable,
    freq: Option<&FrequencyOrder>,
    writers: &[PartitionWriter],
) -> Result<PartitionStats, KmtricksError> {
    let mut stats = PartitionStats::default();
    let resolved = format.resolve(Some(path));

    let sequences: Box<dyn Iterator<Item = Result<Vec<u8>, KmtricksError>>> = if resolved.is_fastq()
    {
        let reader =
            fastq::Reader::from_file(path).map_err(|e| KmtricksError::io(e, path))?;
        Box::new(reader.records().map(move |r| {
            r.map(|rec| rec.seq().to_vec())
                .map_err(|e| KmtricksError::format(e.to_string(), path))
        }))
    } else {
        let reader =
            fasta::Reader::from_file(path).map_err(|e| KmtricksError::io(e, path))?;
        Box::new(reader.records().map(move |r| {
            r.map(|rec| rec.seq().to_vec())
                .map_err(|e| KmtricksError::format(e.to_string(), path))
        }))
    };

    for record in sequences {
        let seq = record?;
        stats.reads_processed += 1;
        stats.bases_processed += seq.len() as u64;

        for run in split_at_ambiguous(&seq) {
            if run.len() < k {
                continue;
            }
            emit_run::<W>(run, k, m, table, freq, writers, &mut stats)?;
        }
    }

    Ok(stats)
}

fn emit_run<W: KmerWord>(
    run: &[u8],
    k: usize,
    m: usize,
    table: &RepartitionTable,
    freq: Option<&FrequencyOrder>,
    writers: &[PartitionWriter],
    stats: &mut PartitionStats,
) -> Result<(), KmtricksError> {
    let mut window = Kmer::<W>::encode(&run[0..k])?;
    let mut current_key =
        minimizer_partition_key(window.canonical(), m, table.mode, freq);
    let mut current_partition = table.get(current_key);
    let mut run_start = 0usize;
    let mut run_len = k;

    for (offset, &next_base) in run.iter().enumerate().skip(k) {
        let base = crate::kmer::Base::try_from(next_base)?;
        window = window.shift_in(base);
        let key = minimizer_partition_key(window.canonical(), m, table.mode, freq);
        let partition = table.get(key);

        if partition == current_partition {
            run_len += 1;
            continue;
        }

        flush_super_kmer(
            &run[run_start..run_start + run_len],
            run_len - k + 1,
            current_partition,
            writers,
            stats,
        )?;

        run_start = offset - k + 1;
        run_len = k;
        current_key = key;
        current_partition = partition;
    }

    flush_super_kmer(
        &run[run_start..run_start + run_len],
        run_len - k + 1,
        current_partition,
        writers,
        stats,
    )?;
    let _ = current_key;
    Ok(())
}

fn flush_super_kmer(
    seq: &[u8],
    count: usize,
    partition: u16,
    writers: &[PartitionWriter],
    stats: &mut PartitionStats,
) -> Result<(), KmtricksError> {
    let sk = SuperKmer::encode(seq, count as u8)?;
    stats.superkmers_emitted += 1;
    stats.kmers_emitted += count as u64;
    writers[partition as usize].write_block(std::slice::from_ref(&sk))
}

/// Builds a frequency table of m-mer occurrences over a sample of reads,
/// for [`crate::repartition::RepartitionTable::build_frequency`].
pub fn sample_mmer_frequencies(
    path: &Path,
    format: SequenceFormat,
    k: usize,
    m: usize,
    max_reads: usize,
) -> Result<Vec<u64>, KmtricksError> {
    let mut counts = vec![0u64; 1usize << (2 * m)];
    let resolved = format.resolve(Some(path));

    let mut seen = 0usize;
    let mut visit = |seq: &[u8]| {
        for run in split_at_ambiguous(seq) {
            if run.len() < k {
                continue;
            }
            for start in 0..=(run.len() - k) {
                let kmer = match Kmer::<u64>::encode(&run[start..start + k]) {
                    Ok(kmer) => kmer,
                    Err(_) => continue,
                };
                for offset in 0..=(k - m) {
                    let v = kmer.extract_mmer(offset, m);
                    let decoded = decode_mmer(v, m);
                    if decoded.len() == m {
                        counts[v as usize] += 1;
                    }
                }
            }
        }
    };

    if resolved.is_fastq() {
        let reader = fastq::Reader::from_file(path).map_err(|e| KmtricksError::io(e, path))?;
        for record in reader.records() {
            let record = record.map_err(|e| KmtricksError::format(e.to_string(), path))?;
            visit(record.seq());
            seen += 1;
            if seen >= max_reads {
                break;
            }
        }
    } else {
        let reader = fasta::Reader::from_file(path).map_err(|e| KmtricksError::io(e, path))?;
        for record in reader.records() {
            let record = record.map_err(|e| KmtricksError::format(e.to_string(), path))?;
            visit(record.seq());
            seen += 1;
            if seen >= max_reads {
                break;
            }
        }
    }

    Ok(counts)
}
