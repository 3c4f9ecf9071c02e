use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use kmtricks::binformat::{
    BitMatrixHeader, BitVectorHeader, CountMatrixHeader, HistFileHeader, KmerFileHeader,
    PaMatrixHeader,
};
use kmtricks::cli::{
    AggregateArgs, CombineArgs, CountArgs, Cli, Command, CoreArgs, DumpArgs, FilterArgs,
    FormatArgs, IndexArgs, InfosArgs, MergeArgs, PipelineArgs, QueryArgs, RepartArgs,
    RepartitionTypeArg, SuperkArgs,
};
use kmtricks::config::{KeySpace, MatrixFormat, OutputMode, RunConfig, SoftMin};
use kmtricks::counter::{write_count_file, CountKeySpace, HashWindow};
use kmtricks::error::KmtricksError;
use kmtricks::filter::{filter_run_dir, read_count_matrix, read_pa_matrix};
use kmtricks::fof::Fof;
use kmtricks::format::SequenceFormat;
use kmtricks::histogram::Histogram;
use kmtricks::kmer::HashKind;
use kmtricks::merger::{MergedRow, Merger, SoftMinPolicy};
use kmtricks::mmer::MinimizerType;
use kmtricks::partitioner::sample_mmer_frequencies;
use kmtricks::pipeline::{
    count_partition_dispatch, emit_sample_dispatch, read_per_sample_thresholds, write_bf_matrix,
    write_bfc_matrix, write_bft_matrix, write_count_matrix, write_pa_matrix, Pipeline,
};
use kmtricks::repartition::RepartitionTable;
use kmtricks::rundir::{RunDir, RunManifest};
use kmtricks::signals::{self, CancellationToken};
use kmtricks::superkmer::PartitionWriter;

/// Set `RUST_LOG=kmtricks=debug` to see debug output.
#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

fn main() -> ExitCode {
    #[cfg(feature = "tracing")]
    init_tracing();

    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<(), KmtricksError> {
    match cli.command {
        Command::Pipeline(args) => run_pipeline(args),
        Command::Repart(args) => run_repart(args),
        Command::Superk(args) => run_superk(args),
        Command::Count(args) => run_count(args),
        Command::Merge(args) => run_merge(args),
        Command::Format(args) => run_format(args),
        Command::Filter(args) => run_filter(args),
        Command::Aggregate(args) => run_aggregate(args),
        Command::Dump(args) => run_dump(args),
        Command::Combine(args) => run_combine(args),
        Command::Index(args) => run_index(args),
        Command::Query(args) => run_query(args),
        Command::Infos(args) => run_infos(args),
    }
}

/// Parses `--soft-min`: `auto:<q>` for a per-histogram quantile, a bare
/// integer for a uniform threshold, anything else a per-sample threshold
/// file path.
fn parse_soft_min(s: &str) -> Result<SoftMin, KmtricksError> {
    if let Some(q) = s.strip_prefix("auto:") {
        let q: f64 = q.parse().map_err(|_| KmtricksError::Input {
            details: format!("invalid --soft-min quantile '{s}'"),
        })?;
        return Ok(SoftMin::Quantile(q));
    }
    if let Ok(n) = s.parse::<u32>() {
        return Ok(SoftMin::Uniform(n));
    }
    Ok(SoftMin::PerSample(PathBuf::from(s)))
}

#[allow(clippy::too_many_arguments)]
fn build_config(
    core: &CoreArgs,
    hard_min: u32,
    soft_min: SoftMin,
    recurrence_min: u32,
    share_min: u32,
    mode: &str,
    bloom_size: u64,
    bitw: u8,
    compress: bool,
    hist: bool,
) -> Result<RunConfig, KmtricksError> {
    RunConfig {
        kmer_size: core.kmer_size,
        minimizer_size: core.minimizer_size,
        minimizer_type: core.minimizer_type.into(),
        repartition_ordered: core.repartition_type == RepartitionTypeArg::Ordered,
        nb_partitions: core.nb_partitions,
        hard_min,
        soft_min,
        recurrence_min,
        share_min,
        mode: OutputMode::parse(mode)?,
        bloom_size,
        bitw,
        compress,
        hist,
    }
    .validate()
}

fn run_pipeline(args: PipelineArgs) -> Result<(), KmtricksError> {
    let fof = Fof::read(&args.core.file)?;
    let config = build_config(
        &args.core,
        args.hard_min,
        parse_soft_min(&args.soft_min)?,
        args.recurrence_min,
        args.share_min,
        &args.mode,
        args.bloom_size,
        args.bitw,
        args.compress,
        args.hist,
    )?;

    eprintln!(
        "{} {} samples, k={}, m={}, P={}",
        "pipeline:".bold(),
        fof.samples.len(),
        config.kmer_size,
        config.minimizer_size,
        config.nb_partitions
    );

    let cancel = CancellationToken::new();
    signals::install_handler(cancel.clone());

    let run_dir = RunDir::new(args.core.run_dir.clone());
    let summary = Pipeline::new(config, run_dir, fof)
        .cancellation(cancel)
        .run()?;

    eprintln!(
        "{} {} rows kept across {} partitions",
        "done:".green().bold(),
        summary.rows_kept,
        summary.nb_partitions
    );
    Ok(())
}

fn build_repartition_table(
    fof: &Fof,
    k: usize,
    m: usize,
    nb_partitions: u16,
    minimizer_type: MinimizerType,
) -> Result<RepartitionTable, KmtricksError> {
    let mut weights = vec![0u64; 1usize << (2 * m)];
    for sample in &fof.samples {
        for file in &sample.files {
            let counts = sample_mmer_frequencies(file, SequenceFormat::Auto, k, m, 10_000)?;
            for (w, c) in weights.iter_mut().zip(counts.iter()) {
                *w += c;
            }
        }
    }
    Ok(match minimizer_type {
        MinimizerType::Lexicographic => {
            RepartitionTable::build_lexicographic(m, nb_partitions, &weights)
        }
        MinimizerType::Frequency => RepartitionTable::build_frequency(m, nb_partitions, &weights),
    })
}

fn run_repart(args: RepartArgs) -> Result<(), KmtricksError> {
    let fof = Fof::read(&args.core.file)?;
    let run_dir = RunDir::new(args.core.run_dir.clone());
    run_dir.init()?;

    let minimizer_type: MinimizerType = args.core.minimizer_type.into();
    let table = build_repartition_table(
        &fof,
        args.core.kmer_size,
        args.core.minimizer_size,
        args.core.nb_partitions,
        minimizer_type,
    )?;
    table.write(&run_dir.repartition_table_path())?;

    let config = build_config(
        &args.core,
        1,
        SoftMin::Uniform(1),
        1,
        0,
        "kmer:count:bin",
        0,
        0,
        false,
        false,
    )?;
    RunManifest::new(config, &fof).write(&run_dir.manifest_path())?;

    eprintln!(
        "{} {} partitions over {} m-mer values",
        "repart:".bold(),
        args.core.nb_partitions,
        table.len()
    );
    Ok(())
}

fn run_superk(args: SuperkArgs) -> Result<(), KmtricksError> {
    let fof = Fof::read(&args.core.file)?;
    let run_dir = RunDir::new(args.core.run_dir.clone());
    let table = RepartitionTable::load(&run_dir.repartition_table_path())?;
    let freq = table.freq_order().cloned();

    for sample in &fof.samples {
        let writers: Vec<PartitionWriter> = (0..args.core.nb_partitions)
            .map(|p| PartitionWriter::create(run_dir.superk_path(&sample.id, p)))
            .collect::<Result<_, _>>()?;
        for file in &sample.files {
            emit_sample_dispatch(
                file,
                SequenceFormat::Auto,
                args.core.kmer_size,
                args.core.minimizer_size,
                &table,
                freq.as_ref(),
                &writers,
            )?;
        }
        for w in writers {
            w.close()?;
        }
        eprintln!("{} sample '{}'", "superk:".bold(), sample.id);
    }
    Ok(())
}

fn run_count(args: CountArgs) -> Result<(), KmtricksError> {
    let fof = Fof::read(&args.core.file)?;
    let run_dir = RunDir::new(args.core.run_dir.clone());
    let mode = OutputMode::parse(&args.mode)?;
    let key_space = match mode.key_space {
        KeySpace::Kmer => CountKeySpace::Kmer,
        KeySpace::Hash => CountKeySpace::Hash(HashKind::Fast),
    };

    let window_width = (args.bloom_size > 0)
        .then(|| (args.bloom_size as usize / args.core.nb_partitions.max(1) as usize).max(1));

    for sample in &fof.samples {
        let mut hist = args.hist.then(|| Histogram::new(1, 1_000_000));
        for partition in 0..args.core.nb_partitions {
            let superk_path = run_dir.superk_path(&sample.id, partition);
            let window = window_width.map(|w| HashWindow { w, partition });
            let counted = count_partition_dispatch(
                &superk_path,
                args.core.kmer_size,
                key_space,
                args.hard_min,
                window,
                hist.as_mut(),
            )?;
            write_count_file(
                &run_dir.count_path(&sample.id, partition),
                &sample.id,
                partition,
                args.core.kmer_size as u16,
                key_space,
                &counted,
            )?;
        }
        if let Some(hist) = hist {
            hist.write(
                &run_dir.histogram_path(&sample.id),
                &sample.id,
                args.core.kmer_size as u16,
            )?;
        }
        eprintln!("{} sample '{}'", "count:".bold(), sample.id);
    }
    Ok(())
}

/// Resolves `--soft-min` against a run directory already holding the
/// histograms `Quantile` needs, mirroring [`Pipeline`]'s internal merge-stage
/// resolution for the standalone CLI merge path.
fn resolve_soft_min(
    run_dir: &RunDir,
    fof: &Fof,
    soft_min: SoftMin,
) -> Result<SoftMinPolicy, KmtricksError> {
    match soft_min {
        SoftMin::Uniform(t) => Ok(SoftMinPolicy::Uniform(t)),
        SoftMin::Quantile(q) => {
            let mut thresholds = Vec::with_capacity(fof.samples.len());
            for sample in &fof.samples {
                let hist = Histogram::read(&run_dir.histogram_path(&sample.id))?;
                thresholds.push(hist.quantile(q));
            }
            Ok(SoftMinPolicy::PerSample(thresholds))
        }
        SoftMin::PerSample(path) => Ok(SoftMinPolicy::PerSample(read_per_sample_thresholds(
            &path,
            fof.samples.len(),
        )?)),
    }
}

fn run_merge(args: MergeArgs) -> Result<(), KmtricksError> {
    let fof = Fof::read(&args.core.file)?;
    let run_dir = RunDir::new(args.core.run_dir.clone());
    let mode = OutputMode::parse(&args.mode)?;
    let nb_samples = fof.samples.len();
    let sample_ids: Vec<String> = fof.samples.iter().map(|s| s.id.clone()).collect();

    let soft_min = resolve_soft_min(&run_dir, &fof, parse_soft_min(&args.soft_min)?)?;
    let w = args.bloom_size as usize / args.core.nb_partitions.max(1) as usize;

    let mut rows_kept = 0u64;
    for partition in 0..args.core.nb_partitions {
        let paths: Vec<Option<PathBuf>> = fof
            .samples
            .iter()
            .map(|s| {
                let p = run_dir.count_path(&s.id, partition);
                p.exists().then_some(p)
            })
            .collect();
        let mut merger = Merger::open(
            &paths,
            soft_min.clone(),
            args.recurrence_min,
            args.share_min,
        )?;

        let mut rows: Vec<MergedRow> = Vec::new();
        while let Some(row) = merger.next_row()? {
            if row.keep {
                rows_kept += 1;
                rows.push(row);
            }
        }

        let matrix_path = run_dir.matrix_path(partition);
        match mode.matrix_format {
            MatrixFormat::Count => {
                let count_rows: Vec<_> = rows.iter().map(|r| (r.key, r.counts.clone())).collect();
                write_count_matrix(&matrix_path, partition, &count_rows)?;
            }
            MatrixFormat::Pa => {
                let pa_rows: Vec<Vec<bool>> = rows
                    .iter()
                    .map(|r| r.counts.iter().map(|&c| c > 0).collect())
                    .collect();
                write_pa_matrix(&matrix_path, partition, nb_samples, &pa_rows)?;
            }
            MatrixFormat::Bf => write_bf_matrix(&run_dir, partition, &sample_ids, &rows, w)?,
            MatrixFormat::Bft => write_bft_matrix(&run_dir, partition, nb_samples, &rows, w)?,
            MatrixFormat::Bfc => {
                write_bfc_matrix(&run_dir, partition, &sample_ids, &rows, w, args.bitw)?
            }
        }
    }

    eprintln!("{} {rows_kept} rows kept", "merge:".bold());
    Ok(())
}

/// Re-encodes an existing matrix into a different `count`/`pa` output mode.
/// Bloom-projected formats carry no per-row key and cannot be reformatted.
fn run_format(args: FormatArgs) -> Result<(), KmtricksError> {
    let run_dir = RunDir::new(args.run_dir.clone());
    let mut manifest = RunManifest::read(&run_dir.manifest_path())?;
    let new_mode = OutputMode::parse(&args.mode)?;
    let nb_samples = manifest.samples.len();

    if matches!(
        manifest.config.mode.matrix_format,
        MatrixFormat::Bf | MatrixFormat::Bft | MatrixFormat::Bfc
    ) || matches!(
        new_mode.matrix_format,
        MatrixFormat::Bf | MatrixFormat::Bft | MatrixFormat::Bfc
    ) {
        return Err(KmtricksError::Config {
            details: "format only re-encodes between count and pa matrices".to_string(),
        });
    }

    for partition in 0..manifest.config.nb_partitions {
        let matrix_path = run_dir.matrix_path(partition);
        if !matrix_path.exists() {
            continue;
        }
        match (manifest.config.mode.matrix_format, new_mode.matrix_format) {
            (MatrixFormat::Count, MatrixFormat::Pa) => {
                let rows = read_count_matrix(&matrix_path, nb_samples)?;
                let pa_rows: Vec<Vec<bool>> = rows
                    .into_iter()
                    .map(|(_, counts)| counts.iter().map(|&c| c > 0).collect())
                    .collect();
                write_pa_matrix(&matrix_path, partition, nb_samples, &pa_rows)?;
            }
            (MatrixFormat::Pa, MatrixFormat::Count) => {
                let (_, rows) = read_pa_matrix(&matrix_path)?;
                let count_rows: Vec<(u64, Vec<u32>)> = rows
                    .into_iter()
                    .map(|(key, bits)| (key, bits.iter().map(|&b| u32::from(b)).collect()))
                    .collect();
                write_count_matrix(&matrix_path, partition, &count_rows)?;
            }
            _ => {}
        }
    }

    manifest.config.mode = new_mode;
    manifest.write(&run_dir.manifest_path())?;
    eprintln!("{} re-encoded to '{}'", "format:".bold(), args.mode);
    Ok(())
}

fn run_filter(args: FilterArgs) -> Result<(), KmtricksError> {
    let run_dir = RunDir::new(args.run_dir.clone());
    let out_dir = args.run_dir.join("filtered");
    let stats = filter_run_dir(&run_dir, &args.file, SequenceFormat::Auto, &out_dir)?;
    eprintln!(
        "{} kept {}/{} rows, written to {}",
        "filter:".bold(),
        stats.rows_kept,
        stats.rows_total,
        out_dir.display()
    );
    Ok(())
}

fn aggregate_run_dir(run_dir: &RunDir, manifest: &RunManifest) -> Result<Vec<u8>, KmtricksError> {
    let mut out = Vec::new();
    for partition in 0..manifest.config.nb_partitions {
        let path = run_dir.matrix_path(partition);
        if path.exists() {
            out.extend(std::fs::read(&path).map_err(|e| KmtricksError::io(e, &path))?);
        }
    }
    Ok(out)
}

fn run_aggregate(args: AggregateArgs) -> Result<(), KmtricksError> {
    let run_dir = RunDir::new(args.run_dir.clone());
    let manifest = RunManifest::read(&run_dir.manifest_path())?;
    let blob = aggregate_run_dir(&run_dir, &manifest)?;
    std::fs::write(&args.output, &blob).map_err(|e| KmtricksError::io(e, &args.output))?;
    eprintln!(
        "{} {} bytes from {} partitions -> {}",
        "aggregate:".bold(),
        blob.len(),
        manifest.config.nb_partitions,
        args.output.display()
    );
    Ok(())
}

fn run_combine(args: CombineArgs) -> Result<(), KmtricksError> {
    let mut combined = Vec::new();
    for dir in &args.run_dirs {
        let run_dir = RunDir::new(dir.clone());
        let manifest = RunManifest::read(&run_dir.manifest_path())?;
        combined.extend(aggregate_run_dir(&run_dir, &manifest)?);
    }
    std::fs::write(&args.output, &combined).map_err(|e| KmtricksError::io(e, &args.output))?;
    eprintln!(
        "{} {} run directories, {} bytes -> {}",
        "combine:".bold(),
        args.run_dirs.len(),
        combined.len(),
        args.output.display()
    );
    Ok(())
}

/// Tries each header shape in turn until one parses, then prints its fields.
fn run_dump(args: DumpArgs) -> Result<(), KmtricksError> {
    let path = args.path.as_path();
    if let Ok(h) = KmerFileHeader::read(path) {
        println!("{h:#?}");
    } else if let Ok(h) = CountMatrixHeader::read(path) {
        println!("{h:#?}");
    } else if let Ok(h) = PaMatrixHeader::read(path) {
        println!("{h:#?}");
    } else if let Ok(h) = BitVectorHeader::read(path) {
        println!("{h:#?}");
    } else if let Ok(h) = BitMatrixHeader::read(path) {
        println!("{h:#?}");
    } else if let Ok(h) = HistFileHeader::read(path) {
        println!("{h:#?}");
    } else {
        return Err(KmtricksError::format("unrecognized file header", path));
    }
    Ok(())
}

fn run_index(_args: IndexArgs) -> Result<(), KmtricksError> {
    Err(KmtricksError::Config {
        details: "bloom-filter-tree indexing integration is outside this crate's scope; only its interface is defined".to_string(),
    })
}

fn run_query(_args: QueryArgs) -> Result<(), KmtricksError> {
    Err(KmtricksError::Config {
        details: "bloom-filter-tree query integration is outside this crate's scope; only its interface is defined".to_string(),
    })
}

fn run_infos(args: InfosArgs) -> Result<(), KmtricksError> {
    let run_dir = RunDir::new(args.run_dir.clone());
    let manifest = RunManifest::read(&run_dir.manifest_path())?;
    println!("{}: {}", "run dir".bold(), args.run_dir.display());
    println!(
        "{}: k={} m={} P={} mode={:?}",
        "config".bold(),
        manifest.config.kmer_size,
        manifest.config.minimizer_size,
        manifest.config.nb_partitions,
        manifest.config.mode.matrix_format
    );
    println!("{}: {}", "samples".bold(), manifest.samples.join(", "));
    for partition in 0..manifest.config.nb_partitions {
        let path = run_dir.matrix_path(partition);
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        println!("  partition {partition}: {size} bytes");
    }
    Ok(())
}
