//! The optional merge-stage plugin contract (component §6). Only the
//! interface is in scope here: an implementer would usually get this via a
//! dynamically loaded shared object, but loading one is a packaging concern
//! outside this crate, so this module stubs the loader behind the
//! `plugin` feature and leaves the trait as the real contract.

use crate::error::KmtricksError;

/// Callback contract invoked by the merger for every kept row, mirroring
/// the original's `set_out_dir` / `set_kmer_size` / `set_partition` /
/// `process` sequence. Configuration is an opaque string, same as the
/// original interface.
pub trait MergePlugin: Send {
    fn set_out_dir(&mut self, out_dir: &std::path::Path);
    fn set_kmer_size(&mut self, k: usize);
    fn set_partition(&mut self, partition_id: u16);

    /// Called once per merged, kept k-mer row.
    fn process(&mut self, partition_id: u16, key: u64, per_sample_counts: &[u32]);
}

/// A plugin that records every row it sees, useful for tests and as the
/// default no-op when no shared object is configured.
#[derive(Debug, Default)]
pub struct NullPlugin;

impl MergePlugin for NullPlugin {
    fn set_out_dir(&mut self, _out_dir: &std::path::Path) {}
    fn set_kmer_size(&mut self, _k: usize) {}
    fn set_partition(&mut self, _partition_id: u16) {}
    fn process(&mut self, _partition_id: u16, _key: u64, _per_sample_counts: &[u32]) {}
}

/// Loads a plugin by name. Without the `plugin` feature this only resolves
/// the built-in `"null"` plugin; with it, a real implementation would
/// `dlopen` a shared object exposing the four contract symbols.
///
/// # Errors
///
/// Returns [`KmtricksError::Config`] if `name` isn't a known plugin.
pub fn load_plugin(name: &str) -> Result<Box<dyn MergePlugin>, KmtricksError> {
    match name {
        "null" => Ok(Box::new(NullPlugin)),
        #[cfg(feature = "plugin")]
        other => load_dynamic(other),
        #[cfg(not(feature = "plugin"))]
        other => Err(KmtricksError::Config {
            details: format!(
                "unknown plugin '{other}' (dynamic loading requires the `plugin` feature)"
            ),
        }),
    }
}

#[cfg(feature = "plugin")]
fn load_dynamic(_name: &str) -> Result<Box<dyn MergePlugin>, KmtricksError> {
    Err(KmtricksError::Config {
        details: "dynamic plugin loading is not yet implemented".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_plugin_loads_by_name() {
        let plugin = load_plugin("null").unwrap();
        drop(plugin);
    }

    #[test]
    fn unknown_plugin_is_a_config_error() {
        let err = load_plugin("nonexistent").unwrap_err();
        assert!(matches!(err, KmtricksError::Config { .. }));
    }

    #[test]
    fn null_plugin_accepts_every_call() {
        let mut plugin = NullPlugin;
        plugin.set_out_dir(std::path::Path::new("/tmp"));
        plugin.set_kmer_size(21);
        plugin.set_partition(3);
        plugin.process(3, 42, &[1, 2, 3]);
    }
}
