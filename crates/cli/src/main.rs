//! # ltx - LTX file inspection tool
//!
//! A thin command-line wrapper over the [`ltx`] decoder.
//!
//! ## Commands
//!
//! ```text
//! checksum   Compute the rolling LTX checksum of a SQLite database file
//! dump       Print the header, page headers, and trailer of an LTX file
//! list       Print a table row per LTX file (TXID range, commit, checksums)
//! verify     Read LTX files end-to-end and verify their checksums
//! version    Print the version
//! ```
//!
//! Exits 0 on success and 1 on a parse error or integrity failure, with a
//! human-readable message on stderr.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ltx::Decoder;

#[derive(Parser)]
#[command(name = "ltx", about = "Inspects LTX transaction files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Computes the rolling LTX checksum of a SQLite database file.
    Checksum(ChecksumArgs),
    /// Prints metadata and page headers of LTX files.
    Dump(DumpArgs),
    /// Prints header and trailer information for a set of LTX files.
    List(ListArgs),
    /// Reads and verifies the checksums of a set of LTX files.
    Verify(VerifyArgs),
    /// Prints the version.
    Version,
}

#[derive(Args)]
struct ChecksumArgs {
    /// Database page size, in bytes.
    #[arg(long, default_value_t = 4096)]
    page_size: u32,

    /// Path to the SQLite database file.
    path: PathBuf,
}

#[derive(Args)]
struct DumpArgs {
    /// LTX files to dump.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct ListArgs {
    /// LTX files to list.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct VerifyArgs {
    /// LTX files to verify.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Checksum(args) => run_checksum(&args),
        Command::Dump(args) => run_dump(&args),
        Command::List(args) => run_list(&args),
        Command::Verify(args) => run_verify(&args),
        Command::Version => {
            println!("ltx {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run_checksum(args: &ChecksumArgs) -> Result<()> {
    if !ltx::is_valid_page_size(args.page_size) {
        bail!("invalid page size: {}", args.page_size);
    }

    let f = File::open(&args.path)
        .with_context(|| format!("open database file: {}", args.path.display()))?;
    let chksum = ltx::checksum_reader(f, args.page_size as usize)
        .with_context(|| format!("checksum database file: {}", args.path.display()))?;

    println!("{}", chksum);
    Ok(())
}

fn run_dump(args: &DumpArgs) -> Result<()> {
    for path in &args.paths {
        dump_file(path).with_context(|| path.display().to_string())?;
    }
    Ok(())
}

fn dump_file(path: &Path) -> Result<()> {
    let f = File::open(path)?;
    let mut dec = Decoder::new(f);
    dec.decode_header()?;

    let hdr = dec.header();
    println!("# HEADER");
    println!("version: {}", hdr.version);
    println!("flags: {:#010x}", hdr.flags);
    println!("page_size: {}", hdr.page_size);
    println!("commit: {}", hdr.commit);
    println!("min_txid: {}", hdr.min_txid);
    println!("max_txid: {}", hdr.max_txid);
    println!("timestamp: {}", format_header_timestamp(hdr.timestamp));
    println!("pre_apply_checksum: {}", hdr.pre_apply_checksum);
    println!("wal_offset: {}", hdr.wal_offset);
    println!("wal_size: {}", hdr.wal_size);
    println!("wal_salt1: {}", hdr.wal_salt1);
    println!("wal_salt2: {}", hdr.wal_salt2);
    println!("node_id: {}", hdr.node_id);
    println!();

    println!("# PAGES");
    let mut data = vec![0u8; hdr.page_size as usize];
    while let Some(page_hdr) = dec.decode_page(&mut data)? {
        println!(
            "pgno={} checksum={}",
            page_hdr.pgno,
            ltx::checksum_page(page_hdr.pgno, &data)
        );
    }
    println!();

    dec.close()?;

    let trailer = dec.trailer();
    println!("# TRAILER");
    println!("post_apply_checksum: {}", trailer.post_apply_checksum);
    println!("file_checksum: {}", trailer.file_checksum);

    Ok(())
}

fn run_list(args: &ListArgs) -> Result<()> {
    println!(
        "{:<16}  {:<16}  {:>8}  {:>8}  {:<16}  {:<16}  {}",
        "min_txid", "max_txid", "commit", "pages", "preapply", "postapply", "timestamp"
    );

    let mut error_n = 0;
    for path in &args.paths {
        if let Err(err) = list_file(path) {
            error_n += 1;
            eprintln!("{}: {:#}", path.display(), err);
        }
    }

    if error_n != 0 {
        bail!("{} file(s) failed", error_n);
    }
    Ok(())
}

fn list_file(path: &Path) -> Result<()> {
    let f = File::open(path)?;
    let mut dec = Decoder::new(f);
    dec.verify()?;

    let hdr = dec.header();
    let trailer = dec.trailer();
    println!(
        "{:<16}  {:<16}  {:>8}  {:>8}  {:<16}  {:<16}  {}",
        hdr.min_txid.to_string(),
        hdr.max_txid.to_string(),
        hdr.commit,
        dec.page_n(),
        hdr.pre_apply_checksum,
        trailer.post_apply_checksum,
        format_header_timestamp(hdr.timestamp),
    );
    Ok(())
}

fn run_verify(args: &VerifyArgs) -> Result<()> {
    let mut ok_n = 0;
    let mut error_n = 0;
    for path in &args.paths {
        match verify_file(path) {
            Ok(()) => ok_n += 1,
            Err(err) => {
                error_n += 1;
                println!("{}: {:#}", path.display(), err);
            }
        }
    }

    if error_n != 0 {
        bail!("{} ok, {} invalid", ok_n, error_n);
    }

    println!("ok");
    Ok(())
}

fn verify_file(path: &Path) -> Result<()> {
    let f = File::open(path)?;
    let mut dec = Decoder::new(f);
    dec.verify()?;
    Ok(())
}

/// Formats a header timestamp for display; zero means unset.
fn format_header_timestamp(millis: i64) -> String {
    if millis == 0 {
        return String::new();
    }
    match chrono::DateTime::from_timestamp_millis(millis) {
        Some(t) => ltx::format_timestamp(t),
        None => millis.to_string(),
    }
}
