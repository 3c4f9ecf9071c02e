//! kmtricks: builds a per-k-mer count or presence/absence matrix across
//! many DNA sequencing samples, reusing one partitioning scheme so a given
//! k-mer's data lands in the same partition across every sample.
//!
//! The pipeline has five stages, each its own module: [`repartition`]
//! assigns minimizers to partitions, [`partitioner`] emits super-k-mers
//! into those partitions per sample, [`counter`] turns each partition's
//! super-k-mers into `(key, abundance)` pairs, [`merger`] N-way merges
//! per-sample count files into matrix rows, and [`bloom`] optionally
//! projects hash-space rows into per-sample Bloom filters. [`scheduler`]
//! and [`taskpool`] drive those stages across a fixed worker pool;
//! [`pipeline`] glues the whole thing into one run. [`filter`] reuses a
//! finished run's repartition table to intersect its matrix against a new
//! sample's k-mers.

pub mod binformat;
pub mod bloom;
pub mod cli;
pub mod config;
pub mod counter;
pub mod error;
pub mod filter;
pub mod fof;
pub mod format;
pub mod histogram;
pub mod input;
pub mod kmer;
pub mod merger;
#[cfg(feature = "mmap")]
pub mod mmap;
pub mod mmer;
pub mod partitioner;
pub mod pipeline;
pub mod plugin;
pub mod progress;
pub mod repartition;
pub mod rundir;
pub mod scheduler;
pub mod signals;
pub mod superkmer;
pub mod taskpool;
