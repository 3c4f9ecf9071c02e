//! Run directory layout and manifest (component §3's `RunManifest`, §9's
//! "global state -> context struct" design note).
//!
//! A run directory holds one subdirectory per pipeline stage plus a
//! `manifest.json` recording the configuration the run was started with,
//! so later stages (and `repart-from` reuse) can validate compatibility
//! without re-deriving it from flags.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::KmtricksError;
use crate::fof::Fof;

/// A file's position in the write-once-then-consume lifecycle tracked per
/// run directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    NotPresent,
    WrittenClosed,
    Consumed,
}

/// On-disk layout rooted at a run directory.
#[derive(Debug, Clone)]
pub struct RunDir {
    pub root: PathBuf,
}

impl RunDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the subdirectory layout if absent.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`] if directory creation fails.
    pub fn init(&self) -> Result<(), KmtricksError> {
        for sub in [
            "repartition",
            "superk",
            "counts",
            "matrix",
            "histograms",
        ] {
            let dir = self.root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| KmtricksError::io(e, &dir))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn repartition_table_path(&self) -> PathBuf {
        self.root.join("repartition").join("minim.repart")
    }

    #[must_use]
    pub fn superk_path(&self, sample_id: &str, partition: u16) -> PathBuf {
        self.root
            .join("superk")
            .join(format!("{sample_id}.{partition}.superk"))
    }

    #[must_use]
    pub fn count_path(&self, sample_id: &str, partition: u16) -> PathBuf {
        self.root
            .join("counts")
            .join(format!("{sample_id}.{partition}.count"))
    }

    #[must_use]
    pub fn matrix_path(&self, partition: u16) -> PathBuf {
        self.root.join("matrix").join(format!("{partition}.matrix"))
    }

    /// Per-(sample, partition) Bloom filter file, for `bf`/`bfc` output
    /// modes where each sample keeps its own window rather than sharing one
    /// partition-wide union vector.
    #[must_use]
    pub fn bloom_path(&self, sample_id: &str, partition: u16) -> PathBuf {
        self.root
            .join("matrix")
            .join(format!("{sample_id}.{partition}.bf"))
    }

    #[must_use]
    pub fn bloom_counting_path(&self, sample_id: &str, partition: u16) -> PathBuf {
        self.root
            .join("matrix")
            .join(format!("{sample_id}.{partition}.bfc"))
    }

    #[must_use]
    pub fn histogram_path(&self, sample_id: &str) -> PathBuf {
        self.root.join("histograms").join(format!("{sample_id}.hist"))
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }
}

/// The persisted manifest: run configuration plus the samples it was
/// started with, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub config: RunConfig,
    pub samples: Vec<String>,
    /// Per-sample file-of-files entry, keyed by sample id, kept as a
    /// `BTreeMap` so the manifest serializes deterministically regardless
    /// of hash-map iteration order.
    pub sample_files: BTreeMap<String, Vec<PathBuf>>,
}

impl RunManifest {
    #[must_use]
    pub fn new(config: RunConfig, fof: &Fof) -> Self {
        let samples = fof.samples.iter().map(|s| s.id.clone()).collect();
        let sample_files = fof
            .samples
            .iter()
            .map(|s| (s.id.clone(), s.files.clone()))
            .collect();
        Self {
            config,
            samples,
            sample_files,
        }
    }

    /// Writes this manifest as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`] on write failure.
    pub fn write(&self, path: &Path) -> Result<(), KmtricksError> {
        let text =
            serde_json::to_string_pretty(self).map_err(|e| KmtricksError::Manifest { source: e })?;
        fs::write(path, text).map_err(|e| KmtricksError::io(e, path))
    }

    /// Reads a manifest previously written by [`Self::write`].
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`] if the file cannot be read, or
    /// [`KmtricksError::Manifest`] if it is not valid JSON for this shape.
    pub fn read(path: &Path) -> Result<Self, KmtricksError> {
        let text = fs::read_to_string(path).map_err(|e| KmtricksError::io(e, path))?;
        serde_json::from_str(&text).map_err(|e| KmtricksError::Manifest { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputMode, SoftMin};
    use crate::mmer::MinimizerType;
    use tempfile::tempdir;

    fn sample_config() -> RunConfig {
        RunConfig {
            kmer_size: 21,
            minimizer_size: 10,
            minimizer_type: MinimizerType::Lexicographic,
            repartition_ordered: false,
            nb_partitions: 4,
            hard_min: 1,
            soft_min: SoftMin::Uniform(1),
            recurrence_min: 1,
            share_min: 0,
            mode: OutputMode::parse("kmer:count:bin").unwrap(),
            bloom_size: 0,
            bitw: 0,
            compress: false,
            hist: false,
        }
    }

    #[test]
    fn init_creates_all_subdirectories() {
        let dir = tempdir().unwrap();
        let run = RunDir::new(dir.path());
        run.init().unwrap();
        for sub in ["repartition", "superk", "counts", "matrix", "histograms"] {
            assert!(dir.path().join(sub).is_dir());
        }
    }

    #[test]
    fn path_helpers_are_stable() {
        let run = RunDir::new("/tmp/run");
        assert_eq!(
            run.count_path("A", 3),
            PathBuf::from("/tmp/run/counts/A.3.count")
        );
    }

    #[test]
    fn bloom_path_helpers_are_per_sample_and_partition() {
        let run = RunDir::new("/tmp/run");
        assert_eq!(
            run.bloom_path("A", 2),
            PathBuf::from("/tmp/run/matrix/A.2.bf")
        );
        assert_eq!(
            run.bloom_counting_path("A", 2),
            PathBuf::from("/tmp/run/matrix/A.2.bfc")
        );
    }

    #[test]
    fn manifest_round_trips() {
        let dir = tempdir().unwrap();
        let fof = Fof::parse("A : a.fa\nB : b.fa ; b2.fa\n").unwrap();
        let manifest = RunManifest::new(sample_config(), &fof);
        let path = dir.path().join("manifest.json");
        manifest.write(&path).unwrap();
        let read_back = RunManifest::read(&path).unwrap();
        assert_eq!(read_back.samples, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(read_back.sample_files["B"].len(), 2);
    }

    #[test]
    fn manifest_preserves_declaration_order() {
        let fof = Fof::parse("Z : z.fa\nA : a.fa\n").unwrap();
        let manifest = RunManifest::new(sample_config(), &fof);
        assert_eq!(manifest.samples, vec!["Z".to_string(), "A".to_string()]);
    }
}
