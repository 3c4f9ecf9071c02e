//! Command-line interface definition: subcommands for the pipeline and each
//! of its stages, plus matrix tooling (component §6).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::mmer::MinimizerType as MmerMinimizerType;

/// A parallel, partitioned k-mer count / presence-absence matrix builder
/// for collections of DNA sequencing samples.
#[derive(Parser, Debug)]
#[command(name = "kmtricks")]
#[command(version, author, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full repartition -> superk -> count -> merge -> format pipeline.
    Pipeline(PipelineArgs),
    /// Build the minimizer repartition table from a sample of the input.
    Repart(RepartArgs),
    /// Emit super-k-mers for one or more samples into partition files.
    Superk(SuperkArgs),
    /// Count k-mers within each partition.
    Count(CountArgs),
    /// Merge per-sample partition counts into the output matrix.
    Merge(MergeArgs),
    /// Re-encode an existing matrix into a different output mode.
    Format(FormatArgs),
    /// Filter/intersect a matrix against another sample's k-mers.
    Filter(FilterArgs),
    /// Aggregate per-partition matrices into a single file.
    Aggregate(AggregateArgs),
    /// Dump a binary matrix/vector file as text.
    Dump(DumpArgs),
    /// Combine multiple run directories' outputs.
    Combine(CombineArgs),
    /// Build a query index over a finished matrix.
    Index(IndexArgs),
    /// Query a previously built index.
    Query(QueryArgs),
    /// Print run directory configuration and statistics.
    Infos(InfosArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum MinimizerTypeArg {
    #[default]
    Lexicographic,
    Frequency,
}

impl From<MinimizerTypeArg> for MmerMinimizerType {
    fn from(v: MinimizerTypeArg) -> Self {
        match v {
            MinimizerTypeArg::Lexicographic => MmerMinimizerType::Lexicographic,
            MinimizerTypeArg::Frequency => MmerMinimizerType::Frequency,
        }
    }
}

/// Flags shared by every stage that needs the run directory and the core
/// k/m/partition parameters.
#[derive(Parser, Debug)]
pub struct CoreArgs {
    /// File-of-files describing input samples.
    #[arg(long = "file")]
    pub file: PathBuf,

    /// Run directory, created if absent.
    #[arg(long = "run-dir")]
    pub run_dir: PathBuf,

    /// K-mer length.
    #[arg(long = "kmer-size", default_value_t = 21)]
    pub kmer_size: usize,

    /// Minimizer length, must be smaller than `kmer_size`.
    #[arg(long = "minimizer-size", default_value_t = 10)]
    pub minimizer_size: usize,

    /// Minimizer selection policy.
    #[arg(long = "minimizer-type", value_enum, default_value = "lexicographic")]
    pub minimizer_type: MinimizerTypeArg,

    /// Minimizer ordering mode for repartitioning.
    #[arg(long = "repartition-type", value_enum, default_value = "unordered")]
    pub repartition_type: RepartitionTypeArg,

    /// Number of partitions.
    #[arg(long = "nb-partitions", default_value_t = 4)]
    pub nb_partitions: u16,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum RepartitionTypeArg {
    #[default]
    Unordered,
    Ordered,
}

#[derive(Parser, Debug)]
pub struct PipelineArgs {
    #[command(flatten)]
    pub core: CoreArgs,

    /// Hard minimum abundance applied during counting.
    #[arg(long = "hard-min", default_value_t = 1)]
    pub hard_min: u32,

    /// Soft minimum abundance applied during merging (a number, or `auto:<q>`).
    #[arg(long = "soft-min", default_value = "1")]
    pub soft_min: String,

    /// Minimum number of samples a k-mer must appear solid in.
    #[arg(long = "recurrence-min", default_value_t = 1)]
    pub recurrence_min: u32,

    /// Minimum number of samples sharing a k-mer for the share-min rescue pass.
    #[arg(long = "share-min", default_value_t = 0)]
    pub share_min: u32,

    /// Output mode `<keyspace>:<format>:<encoding>`, e.g. `kmer:count:bin`.
    #[arg(long = "mode", default_value = "kmer:count:bin")]
    pub mode: String,

    /// Bloom filter size in bits, for `bf`/`bft`/`bfc` output formats.
    #[arg(long = "bloom-size", default_value_t = 0)]
    pub bloom_size: u64,

    /// Bit width of the presence-absence matrix counts.
    #[arg(long = "bitw", default_value_t = 0)]
    pub bitw: u8,

    /// Compress partition files with zstd.
    #[arg(long = "cpr")]
    pub compress: bool,

    /// Emit per-sample abundance histograms.
    #[arg(long = "hist")]
    pub hist: bool,

    /// Stop the pipeline after this stage (repart|superk|count|merge|format).
    #[arg(long = "until")]
    pub until: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RepartArgs {
    #[command(flatten)]
    pub core: CoreArgs,
}

#[derive(Parser, Debug)]
pub struct SuperkArgs {
    #[command(flatten)]
    pub core: CoreArgs,
}

#[derive(Parser, Debug)]
pub struct CountArgs {
    #[command(flatten)]
    pub core: CoreArgs,

    #[arg(long = "hard-min", default_value_t = 1)]
    pub hard_min: u32,

    #[arg(long = "mode", default_value = "kmer:count:bin")]
    pub mode: String,

    #[arg(long = "cpr")]
    pub compress: bool,

    #[arg(long = "hist")]
    pub hist: bool,

    /// Bloom filter width `W`, used to window hash-mode keys into each
    /// partition's `w = W/P` sub-range. Ignored in `kmer` key space.
    #[arg(long = "bloom-size", default_value_t = 0)]
    pub bloom_size: u64,
}

#[derive(Parser, Debug)]
pub struct MergeArgs {
    #[command(flatten)]
    pub core: CoreArgs,

    #[arg(long = "soft-min", default_value = "1")]
    pub soft_min: String,

    #[arg(long = "recurrence-min", default_value_t = 1)]
    pub recurrence_min: u32,

    #[arg(long = "share-min", default_value_t = 0)]
    pub share_min: u32,

    #[arg(long = "mode", default_value = "kmer:count:bin")]
    pub mode: String,

    #[arg(long = "bloom-size", default_value_t = 0)]
    pub bloom_size: u64,

    #[arg(long = "bitw", default_value_t = 0)]
    pub bitw: u8,
}

#[derive(Parser, Debug)]
pub struct FormatArgs {
    /// Run directory containing the matrix to re-encode.
    #[arg(long = "run-dir")]
    pub run_dir: PathBuf,

    #[arg(long = "mode", default_value = "kmer:count:bin")]
    pub mode: String,
}

#[derive(Parser, Debug)]
pub struct FilterArgs {
    /// Run directory containing the matrix to filter.
    #[arg(long = "run-dir")]
    pub run_dir: PathBuf,

    /// Sample files to intersect against.
    #[arg(long = "file")]
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct AggregateArgs {
    #[arg(long = "run-dir")]
    pub run_dir: PathBuf,

    /// Output path for the aggregated matrix.
    #[arg(long = "output")]
    pub output: PathBuf,
}

#[derive(Parser, Debug)]
pub struct DumpArgs {
    /// Path to the binary matrix/vector/hist file to dump.
    pub path: PathBuf,
}

#[derive(Parser, Debug)]
pub struct CombineArgs {
    /// Run directories to combine.
    #[arg(long = "run-dir", num_args = 1..)]
    pub run_dirs: Vec<PathBuf>,

    #[arg(long = "output")]
    pub output: PathBuf,
}

#[derive(Parser, Debug)]
pub struct IndexArgs {
    #[arg(long = "run-dir")]
    pub run_dir: PathBuf,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    #[arg(long = "run-dir")]
    pub run_dir: PathBuf,

    /// K-mer sequence to query.
    pub kmer: String,
}

#[derive(Parser, Debug)]
pub struct InfosArgs {
    #[arg(long = "run-dir")]
    pub run_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipeline_with_defaults() {
        let cli = Cli::parse_from([
            "kmtricks",
            "pipeline",
            "--file",
            "reads.fof",
            "--run-dir",
            "run",
        ]);
        match cli.command {
            Command::Pipeline(args) => {
                assert_eq!(args.core.kmer_size, 21);
                assert_eq!(args.core.nb_partitions, 4);
                assert_eq!(args.hard_min, 1);
            }
            other => panic!("expected Pipeline, got {other:?}"),
        }
    }

    #[test]
    fn parses_custom_k_and_m() {
        let cli = Cli::parse_from([
            "kmtricks",
            "repart",
            "--file",
            "reads.fof",
            "--run-dir",
            "run",
            "--kmer-size",
            "31",
            "--minimizer-size",
            "12",
        ]);
        match cli.command {
            Command::Repart(args) => {
                assert_eq!(args.core.kmer_size, 31);
                assert_eq!(args.core.minimizer_size, 12);
            }
            other => panic!("expected Repart, got {other:?}"),
        }
    }

    #[test]
    fn minimizer_type_arg_converts() {
        assert_eq!(
            MmerMinimizerType::from(MinimizerTypeArg::Frequency),
            MmerMinimizerType::Frequency
        );
    }

    #[test]
    fn combine_accepts_multiple_run_dirs() {
        let cli = Cli::parse_from([
            "kmtricks",
            "combine",
            "--run-dir",
            "a",
            "b",
            "--output",
            "out.bin",
        ]);
        match cli.command {
            Command::Combine(args) => assert_eq!(args.run_dirs.len(), 2),
            other => panic!("expected Combine, got {other:?}"),
        }
    }
}
