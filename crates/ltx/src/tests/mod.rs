//! Unit tests for the LTX library.

mod checksum_tests;
mod file_spec_tests;

use crate::{checksum_page, Checksum, FileSpec};

/// Encodes `spec` and returns the serialized file bytes. The spec's
/// trailer is updated with the resolved file checksum.
pub(crate) fn write_file_spec(spec: &mut FileSpec) -> Vec<u8> {
    let mut buf = Vec::new();
    spec.write_to(&mut buf).expect("write file spec");
    buf
}

/// Decodes a complete file spec from `data`, verifying it along the way.
pub(crate) fn read_file_spec(data: &[u8]) -> FileSpec {
    let mut spec = FileSpec::default();
    spec.read_from(data).expect("read file spec");
    spec
}

/// Returns the rolling checksum of a database state given as
/// `(pgno, data)` pairs.
pub(crate) fn database_checksum(pages: &[(u32, &[u8])]) -> Checksum {
    let mut chksum = Checksum(0);
    for (pgno, data) in pages {
        chksum = Checksum::FLAG | (chksum ^ checksum_page(*pgno, data));
    }
    chksum
}
