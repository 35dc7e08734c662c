use std::io::Write;

use proptest::prelude::*;
use rand::RngCore;
use tempfile::tempdir;

use crate::{checksum_page, checksum_pages, checksum_reader, Checksum, Error};

#[test]
fn checksum_page_is_flagged_and_nonzero() {
    for (pgno, data) in [
        (1u32, &b""[..]),
        (1, &b"\x00"[..]),
        (2, &[0u8; 512][..]),
        (u32::MAX, &b"hello"[..]),
    ] {
        let chksum = checksum_page(pgno, data);
        assert!(chksum.is_flagged());
        assert!(!chksum.is_zero());
    }
}

#[test]
fn checksum_reader_known_value() {
    let mut data = Vec::new();
    data.extend_from_slice(&[0x01; 512]);
    data.extend_from_slice(&[0x02; 512]);
    data.extend_from_slice(&[0x03; 512]);

    let chksum = checksum_reader(data.as_slice(), 512).unwrap();
    assert_eq!(chksum, Checksum(0xefffffffecd99000));
}

#[test]
fn checksum_reader_empty() {
    assert_eq!(checksum_reader(&[] as &[u8], 512).unwrap(), Checksum(0));
}

#[test]
fn checksum_reader_partial_page() {
    let data = [0x01u8; 512];
    let err = checksum_reader(&data[..], 1024).unwrap_err();
    assert!(matches!(
        err,
        Error::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof
    ));
}

/// Runs checksum_pages serially and with `n_workers` threads over the same
/// file and requires identical results.
fn assert_parallel_matches_serial(file_size: u32, n_pages: u32, page_size: u32, n_workers: u32) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    let mut data = vec![0u8; file_size as usize];
    rand::thread_rng().fill_bytes(&mut data);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(&data).unwrap();
    drop(f);

    let mut serial = vec![Checksum(0); n_pages as usize];
    let serial_result = checksum_pages(&path, page_size, n_pages, 1, &mut serial);

    let mut parallel = vec![Checksum(0); n_pages as usize];
    let parallel_result = checksum_pages(&path, page_size, n_pages, n_workers, &mut parallel);

    assert_eq!(
        serial_result.is_ok(),
        parallel_result.is_ok(),
        "serial: {:?}, parallel: {:?}",
        serial_result,
        parallel_result
    );
    if let (Ok(a), Ok(b)) = (&serial_result, &parallel_result) {
        assert_eq!(a, b);
    }

    for (i, (a, b)) in serial.iter().zip(parallel.iter()).enumerate() {
        // Pages the serial pass reached must match exactly; for files
        // shorter than n_pages the failing tail stays untouched in both.
        assert_eq!(a, b, "checksum mismatch at index {}", i);
    }
}

#[test]
fn checksum_pages_matches_serial() {
    // Files divisible into pages.
    for n_workers in 1..=4 {
        assert_parallel_matches_serial(1024 * 4, 4, 1024, n_workers);
    }

    // Short trailing page.
    for n_workers in 1..=4 {
        assert_parallel_matches_serial(1024 * 3 + 100, 4, 1024, n_workers);
    }

    // Empty file.
    for n_workers in 1..=4 {
        assert_parallel_matches_serial(0, 4, 1024, n_workers);
    }
}

#[test]
fn checksum_pages_known_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    let mut data = Vec::new();
    data.extend_from_slice(&[0x01; 512]);
    data.extend_from_slice(&[0x02; 512]);
    std::fs::write(&path, &data).unwrap();

    let mut checksums = vec![Checksum(0); 2];
    let n = checksum_pages(&path, 512, 2, 2, &mut checksums).unwrap();
    assert_eq!(n, 2);
    assert_eq!(checksums[0], checksum_page(1, &[0x01; 512]));
    assert_eq!(checksums[1], checksum_page(2, &[0x02; 512]));
}

proptest! {
    /// Page checksums always carry the sentinel bit, so they can never be
    /// mistaken for the unset value.
    #[test]
    fn checksum_page_always_flagged(pgno in 1u32..=1000, data in prop::collection::vec(any::<u8>(), 0..256)) {
        let chksum = checksum_page(pgno, &data);
        prop_assert!(chksum.is_flagged());
        prop_assert!(!chksum.is_zero());
    }

    /// Replacing one page in the rolling checksum by XOR-ing the old value
    /// out and the new value in matches a full recompute.
    #[test]
    fn rolling_checksum_incremental_replace(
        pages in prop::collection::btree_map(1u32..=64, prop::collection::vec(any::<u8>(), 8..=8), 1..8),
        replacement in prop::collection::vec(any::<u8>(), 8..=8),
    ) {
        let full = |pages: &std::collections::BTreeMap<u32, Vec<u8>>| {
            let mut chksum = Checksum(0);
            for (pgno, data) in pages {
                chksum = Checksum::FLAG | (chksum ^ checksum_page(*pgno, data));
            }
            chksum
        };

        let before = full(&pages);
        let (&pgno, old) = pages.iter().next().unwrap();
        let old_page_checksum = checksum_page(pgno, old);

        let mut replaced = pages.clone();
        replaced.insert(pgno, replacement.clone());

        let incremental = Checksum::FLAG
            | (before ^ old_page_checksum ^ checksum_page(pgno, &replacement));
        prop_assert_eq!(incremental, full(&replaced));
    }

    /// The parallel page checksummer agrees with the serial loop for any
    /// worker count.
    #[test]
    fn checksum_pages_worker_count_irrelevant(
        n_pages in 1u32..=16,
        n_workers in 1u32..=8,
        seed in any::<u64>(),
    ) {
        use rand::SeedableRng;

        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut data = vec![0u8; (n_pages * 512) as usize];
        rng.fill_bytes(&mut data);
        std::fs::write(&path, &data).unwrap();

        let mut serial = vec![Checksum(0); n_pages as usize];
        checksum_pages(&path, 512, n_pages, 1, &mut serial).unwrap();

        let mut parallel = vec![Checksum(0); n_pages as usize];
        checksum_pages(&path, 512, n_pages, n_workers, &mut parallel).unwrap();

        prop_assert_eq!(serial, parallel);
    }
}
