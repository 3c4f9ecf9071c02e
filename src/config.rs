//! Run configuration: the validated parameter set from the CLI flag table
//! (component §6), persisted into the run directory manifest.

use serde::{Deserialize, Serialize};

use crate::error::KmtricksError;
use crate::kmer::{K_MAX, K_MIN};
use crate::mmer::{MinimizerType, M_MAX, M_MIN};

/// `(kmer|hash):(count|pa|bf|bft|bfc):(text|bin)` output mode, per `--mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySpace {
    Kmer,
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixFormat {
    Count,
    Pa,
    Bf,
    Bft,
    Bfc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputEncoding {
    Text,
    Bin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMode {
    pub key_space: KeySpace,
    pub matrix_format: MatrixFormat,
    pub encoding: OutputEncoding,
}

impl OutputMode {
    /// Parses `--mode <m>:<f>:<o>`.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Input`] on an unrecognized component, or
    /// [`KmtricksError::Config`] for the forbidden `kmer:*:bfc` combination
    /// (design notes open question).
    pub fn parse(s: &str) -> Result<Self, KmtricksError> {
        let parts: Vec<&str> = s.split(':').collect();
        let [m, f, o] = parts.as_slice() else {
            return Err(KmtricksError::Input {
                details: format!("--mode '{s}' must have the form <m>:<f>:<o>"),
            });
        };
        let key_space = match *m {
            "kmer" => KeySpace::Kmer,
            "hash" => KeySpace::Hash,
            other => {
                return Err(KmtricksError::Input {
                    details: format!("unknown key space '{other}'"),
                })
            }
        };
        let matrix_format = match *f {
            "count" => MatrixFormat::Count,
            "pa" => MatrixFormat::Pa,
            "bf" => MatrixFormat::Bf,
            "bft" => MatrixFormat::Bft,
            "bfc" => MatrixFormat::Bfc,
            other => {
                return Err(KmtricksError::Input {
                    details: format!("unknown matrix format '{other}'"),
                })
            }
        };
        let encoding = match *o {
            "text" => OutputEncoding::Text,
            "bin" => OutputEncoding::Bin,
            other => {
                return Err(KmtricksError::Input {
                    details: format!("unknown output encoding '{other}'"),
                })
            }
        };
        if key_space == KeySpace::Kmer && matrix_format == MatrixFormat::Bfc {
            return Err(KmtricksError::Config {
                details: "bfc (counting Bloom) is not supported for kmer:...:* combinations"
                    .to_string(),
            });
        }
        Ok(Self {
            key_space,
            matrix_format,
            encoding,
        })
    }
}

/// Merge-time minimum abundance, per `--soft-min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SoftMin {
    Uniform(u32),
    Quantile(f64),
    PerSample(std::path::PathBuf),
}

/// The full validated run configuration (component §6's flag table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub kmer_size: usize,
    pub minimizer_size: usize,
    pub minimizer_type: MinimizerType,
    pub repartition_ordered: bool,
    pub nb_partitions: u16,
    pub hard_min: u32,
    pub soft_min: SoftMin,
    pub recurrence_min: u32,
    pub share_min: u32,
    pub mode: OutputMode,
    pub bloom_size: u64,
    pub bitw: u8,
    pub compress: bool,
    pub hist: bool,
}

impl RunConfig {
    /// Validates the parameter set, matching the ranges named in the CLI
    /// flag table.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Input`] if `kmer_size` or `minimizer_size`
    /// are out of range, or if `minimizer_size >= kmer_size`.
    pub fn validate(self) -> Result<Self, KmtricksError> {
        if !(K_MIN..K_MAX).contains(&self.kmer_size) {
            return Err(KmtricksError::Input {
                details: format!(
                    "--kmer-size {} out of range [{K_MIN}, {})",
                    self.kmer_size, K_MAX
                ),
            });
        }
        if !(M_MIN..=M_MAX).contains(&self.minimizer_size) {
            return Err(KmtricksError::Input {
                details: format!(
                    "--minimizer-size {} out of range [{M_MIN}, {M_MAX}]",
                    self.minimizer_size
                ),
            });
        }
        if self.minimizer_size >= self.kmer_size {
            return Err(KmtricksError::Input {
                details: format!(
                    "--minimizer-size {} must be smaller than --kmer-size {}",
                    self.minimizer_size, self.kmer_size
                ),
            });
        }
        Ok(self)
    }

    /// Checks compatibility with a previous run's configuration for
    /// `repart-from` reuse: k, m, and P must match exactly.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Config`] naming the mismatched field.
    pub fn check_compatible_for_repart_from(&self, previous: &Self) -> Result<(), KmtricksError> {
        if self.kmer_size != previous.kmer_size {
            return Err(KmtricksError::Config {
                details: format!(
                    "repart-from: k mismatch ({} vs {})",
                    self.kmer_size, previous.kmer_size
                ),
            });
        }
        if self.minimizer_size != previous.minimizer_size {
            return Err(KmtricksError::Config {
                details: format!(
                    "repart-from: m mismatch ({} vs {})",
                    self.minimizer_size, previous.minimizer_size
                ),
            });
        }
        if self.nb_partitions != previous.nb_partitions {
            return Err(KmtricksError::Config {
                details: format!(
                    "repart-from: P mismatch ({} vs {})",
                    self.nb_partitions, previous.nb_partitions
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RunConfig {
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
    fn mode_parses_all_components() {
        let mode = OutputMode::parse("hash:bf:bin").unwrap();
        assert_eq!(mode.key_space, KeySpace::Hash);
        assert_eq!(mode.matrix_format, MatrixFormat::Bf);
        assert_eq!(mode.encoding, OutputEncoding::Bin);
    }

    #[test]
    fn mode_rejects_malformed() {
        assert!(OutputMode::parse("kmer:count").is_err());
    }

    #[test]
    fn mode_forbids_kmer_bfc() {
        assert!(OutputMode::parse("kmer:bfc:bin").is_err());
    }

    #[test]
    fn mode_allows_hash_bfc() {
        assert!(OutputMode::parse("hash:bfc:bin").is_ok());
    }

    #[test]
    fn validate_rejects_small_k() {
        let mut cfg = base_config();
        cfg.kmer_size = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_m_not_smaller_than_k() {
        let mut cfg = base_config();
        cfg.minimizer_size = 21;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_seed_scenario_1() {
        let mut cfg = base_config();
        cfg.kmer_size = 5;
        cfg.minimizer_size = 4;
        cfg.nb_partitions = 4;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn repart_from_detects_k_mismatch() {
        let a = base_config();
        let mut b = base_config();
        b.kmer_size = 31;
        assert!(a.check_compatible_for_repart_from(&b).is_err());
    }

    #[test]
    fn repart_from_accepts_identical_config() {
        let a = base_config();
        let b = base_config();
        assert!(a.check_compatible_for_repart_from(&b).is_ok());
    }
}
