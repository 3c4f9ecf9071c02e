//! File-of-files (fof) input parser (component §6).
//!
//! Line-oriented UTF-8: `<sample_id> : <file1> ; <file2> ; ... [! <per_sample_min_abundance>]`.
//! Whitespace is insignificant; empty lines are skipped. `sample_id` is a
//! stable slug used in all derived filenames.

use std::path::{Path, PathBuf};

use crate::error::KmtricksError;

/// One declared sample: an id, its read files, and an optional per-sample
/// abundance override (the `! <n>` suffix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub id: String,
    pub files: Vec<PathBuf>,
    pub min_abundance_override: Option<u32>,
}

/// The parsed sample list, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fof {
    pub samples: Vec<Sample>,
}

impl Fof {
    /// Parses fof text.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Input`] on a malformed line (missing `:`,
    /// empty sample id, or no files).
    pub fn parse(text: &str) -> Result<Self, KmtricksError> {
        let mut samples = Vec::new();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            samples.push(Self::parse_line(line, lineno + 1)?);
        }
        Ok(Self { samples })
    }

    /// Reads and parses an fof file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KmtricksError::Io`] if the file cannot be read, or
    /// [`KmtricksError::Input`] if a line is malformed.
    pub fn read(path: &Path) -> Result<Self, KmtricksError> {
        let text = std::fs::read_to_string(path).map_err(|e| KmtricksError::io(e, path))?;
        Self::parse(&text)
    }

    fn parse_line(line: &str, lineno: usize) -> Result<Sample, KmtricksError> {
        let (id_part, rest) = line.split_once(':').ok_or_else(|| KmtricksError::Input {
            details: format!("fof line {lineno}: missing ':' separating sample id from files"),
        })?;
        let id = id_part.trim().to_string();
        if id.is_empty() {
            return Err(KmtricksError::Input {
                details: format!("fof line {lineno}: empty sample id"),
            });
        }

        let (files_part, override_part) = match rest.rsplit_once('!') {
            Some((files, min)) => (files, Some(min.trim())),
            None => (rest, None),
        };

        let files: Vec<PathBuf> = files_part
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        if files.is_empty() {
            return Err(KmtricksError::Input {
                details: format!("fof line {lineno}: sample '{id}' declares no files"),
            });
        }

        let min_abundance_override = match override_part {
            Some(s) => Some(s.parse::<u32>().map_err(|_| KmtricksError::Input {
                details: format!("fof line {lineno}: invalid per-sample min abundance '{s}'"),
            })?),
            None => None,
        };

        Ok(Sample {
            id,
            files,
            min_abundance_override,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_sample_single_file() {
        let fof = Fof::parse("A : reads.fa").unwrap();
        assert_eq!(fof.samples.len(), 1);
        assert_eq!(fof.samples[0].id, "A");
        assert_eq!(fof.samples[0].files, vec![PathBuf::from("reads.fa")]);
    }

    #[test]
    fn parses_multiple_files() {
        let fof = Fof::parse("A : r1.fa ; r2.fa ; r3.fa").unwrap();
        assert_eq!(fof.samples[0].files.len(), 3);
    }

    #[test]
    fn parses_per_sample_min_abundance() {
        let fof = Fof::parse("A : reads.fa ! 3").unwrap();
        assert_eq!(fof.samples[0].min_abundance_override, Some(3));
    }

    #[test]
    fn skips_blank_lines() {
        let fof = Fof::parse("A : a.fa\n\n\nB : b.fa\n").unwrap();
        assert_eq!(fof.samples.len(), 2);
    }

    #[test]
    fn whitespace_is_insignificant() {
        let fof = Fof::parse("  A  :  a.fa ; b.fa  !  2  ").unwrap();
        assert_eq!(fof.samples[0].id, "A");
        assert_eq!(fof.samples[0].files.len(), 2);
        assert_eq!(fof.samples[0].min_abundance_override, Some(2));
    }

    #[test]
    fn missing_colon_is_error() {
        assert!(Fof::parse("A reads.fa").is_err());
    }

    #[test]
    fn empty_sample_id_is_error() {
        assert!(Fof::parse(" : reads.fa").is_err());
    }

    #[test]
    fn no_files_is_error() {
        assert!(Fof::parse("A :").is_err());
    }

    #[test]
    fn preserves_declaration_order() {
        let fof = Fof::parse("B : b.fa\nA : a.fa\n").unwrap();
        assert_eq!(fof.samples[0].id, "B");
        assert_eq!(fof.samples[1].id, "A");
    }
}
