#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::io::Write;
use std::process::Command;

use tempfile::tempdir;

fn kmtricks_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_kmtricks"))
}

fn write_fasta(path: &std::path::Path, records: &[&str]) {
    let mut f = fs::File::create(path).unwrap();
    for (i, seq) in records.iter().enumerate() {
        writeln!(f, ">r{i}").unwrap();
        writeln!(f, "{seq}").unwrap();
    }
}

#[test]
fn cli_help_flag() {
    let output = kmtricks_cmd().arg("--help").output().expect("spawn");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("kmtricks"));
}

#[test]
fn cli_version_flag() {
    let output = kmtricks_cmd().arg("--version").output().expect("spawn");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_missing_subcommand() {
    let output = kmtricks_cmd().output().expect("spawn");
    assert!(!output.status.success());
}

#[test]
fn pipeline_then_infos_and_dump() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.fa");
    let b = dir.path().join("b.fa");
    // 32bp reads, long enough for k=12/m=5.
    write_fasta(&a, &["ACGTACGTACGTACGTACGTACGTACGTACGT"]);
    write_fasta(&b, &["ACGTACGTACGTACGTACGTACGTTTTTACGT"]);

    let fof_path = dir.path().join("samples.fof");
    fs::write(
        &fof_path,
        format!("s1 : {}\ns2 : {}\n", a.display(), b.display()),
    )
    .unwrap();

    let run_dir = dir.path().join("run");

    let output = kmtricks_cmd()
        .args(["pipeline"])
        .args(["--file", fof_path.to_str().unwrap()])
        .args(["--run-dir", run_dir.to_str().unwrap()])
        .args(["--kmer-size", "12"])
        .args(["--minimizer-size", "5"])
        .args(["--nb-partitions", "2"])
        .args(["--mode", "kmer:count:bin"])
        .output()
        .expect("spawn pipeline");
    assert!(
        output.status.success(),
        "pipeline failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let infos = kmtricks_cmd()
        .args(["infos", "--run-dir", run_dir.to_str().unwrap()])
        .output()
        .expect("spawn infos");
    assert!(infos.status.success());
    let stdout = String::from_utf8_lossy(&infos.stdout);
    assert!(stdout.contains("s1"));
    assert!(stdout.contains("s2"));

    let matrix_path = run_dir.join("matrix").join("0.matrix");
    if matrix_path.exists() {
        let dump = kmtricks_cmd()
            .arg("dump")
            .arg(matrix_path.to_str().unwrap())
            .output()
            .expect("spawn dump");
        assert!(dump.status.success());
    }
}

#[test]
fn format_rejects_bloom_modes() {
    let dir = tempdir().unwrap();
    let run_dir = dir.path().join("run");
    fs::create_dir_all(&run_dir).unwrap();

    let output = kmtricks_cmd()
        .args(["format"])
        .args(["--run-dir", run_dir.to_str().unwrap()])
        .args(["--mode", "hash:bf:bin"])
        .output()
        .expect("spawn format");
    assert!(!output.status.success());
}

#[test]
fn index_and_query_are_explicit_stubs() {
    let dir = tempdir().unwrap();
    let run_dir = dir.path().join("run");

    let output = kmtricks_cmd()
        .args(["index", "--run-dir", run_dir.to_str().unwrap()])
        .output()
        .expect("spawn index");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("scope"));
}
