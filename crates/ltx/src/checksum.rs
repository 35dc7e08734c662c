//! Checksum engine for LTX files.
//!
//! Two checksum families share one CRC64-ISO core:
//!
//! - **Page / rolling database checksums**: [`checksum_page`] hashes a page
//!   number together with its contents; the checksum of a whole database is
//!   the XOR fold of every live page's checksum, sealed with
//!   [`Checksum::FLAG`]. The XOR fold makes applying a transaction
//!   O(#changed pages): XOR out the old page checksum, XOR in the new one.
//! - **File checksums**: a running CRC64 over the serialized LTX bytes,
//!   maintained by the encoder and decoder and sealed in the trailer.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::thread;

use byteorder::{BigEndian, ByteOrder};
use crc::{Crc, Digest, CRC_64_GO_ISO};

use crate::{Checksum, Error, Result};

/// CRC64-ISO, the algorithm the LTX format is defined over.
static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Returns a new running CRC64-ISO digest for a file checksum.
pub(crate) fn new_digest() -> Digest<'static, u64> {
    CRC64.digest()
}

/// Seals a raw CRC64 sum as an LTX checksum.
pub(crate) fn seal(sum: u64) -> Checksum {
    Checksum::FLAG | sum
}

/// Returns the checksum of a single page: CRC64-ISO over the big-endian
/// page number followed by the page data, sealed with [`Checksum::FLAG`].
#[must_use]
pub fn checksum_page(pgno: u32, data: &[u8]) -> Checksum {
    let mut b = [0u8; 4];
    BigEndian::write_u32(&mut b, pgno);

    let mut digest = CRC64.digest();
    digest.update(&b);
    digest.update(data);
    seal(digest.finalize())
}

/// Reads an entire database from `r` in full pages, numbering from 1, and
/// returns its rolling checksum.
///
/// # Errors
///
/// A trailing partial page returns an unexpected-EOF error: databases are
/// page-aligned by construction.
pub fn checksum_reader<R: Read>(mut r: R, page_size: usize) -> Result<Checksum> {
    let mut data = vec![0u8; page_size];

    let mut chksum = Checksum(0);
    let mut pgno: u32 = 1;
    loop {
        if read_full(&mut r, &mut data)? == 0 {
            break;
        }
        chksum = Checksum::FLAG | (chksum ^ checksum_page(pgno, &data));
        pgno += 1;
    }
    Ok(chksum)
}

/// Computes the checksum of pages `1..=n_pages` of the database at `path`,
/// filling `checksums[pgno - 1]` for each.
///
/// Page reads are fanned out over `n_workers` threads, each covering a
/// contiguous page range; the result is identical to the serial loop for
/// any worker count. Returns the number of pages checksummed.
pub fn checksum_pages(
    path: &Path,
    page_size: u32,
    n_pages: u32,
    n_workers: u32,
    checksums: &mut [Checksum],
) -> Result<u32> {
    if (checksums.len() as u64) < u64::from(n_pages) {
        return Err(Error::format(format!(
            "checksum buffer too small: {} pages, {} slots",
            n_pages,
            checksums.len()
        )));
    }
    let out = &mut checksums[..n_pages as usize];

    if n_workers <= 1 || n_pages <= 1 {
        return checksum_page_range(path, page_size, 1, out).map(|()| n_pages);
    }

    // Contiguous ranges keep the read pattern sequential per worker and the
    // output independent of the worker count.
    let chunk_size = n_pages.div_ceil(n_workers) as usize;
    let results: Vec<Result<()>> = thread::scope(|s| {
        let handles: Vec<_> = out
            .chunks_mut(chunk_size)
            .enumerate()
            .map(|(i, chunk)| {
                let start_pgno = (i * chunk_size) as u32 + 1;
                s.spawn(move || checksum_page_range(path, page_size, start_pgno, chunk))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("checksum worker panicked"))
            .collect()
    });

    for result in results {
        result?;
    }
    Ok(n_pages)
}

/// Checksums the contiguous run of pages starting at `start_pgno` into
/// `out`, one page per element.
fn checksum_page_range(
    path: &Path,
    page_size: u32,
    start_pgno: u32,
    out: &mut [Checksum],
) -> Result<()> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::Start(
        u64::from(start_pgno - 1) * u64::from(page_size),
    ))?;

    let mut data = vec![0u8; page_size as usize];
    for (i, slot) in out.iter_mut().enumerate() {
        f.read_exact(&mut data)?;
        *slot = checksum_page(start_pgno + i as u32, &data);
    }
    Ok(())
}

/// Reads until `buf` is full or the stream ends. Returns the bytes read:
/// `buf.len()` on a full read, 0 on a clean EOF at the first byte. A
/// partial read is an unexpected-EOF error.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match r.read(&mut buf[n..]) {
            Ok(0) if n == 0 => return Ok(0),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(m) => n += m,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}
