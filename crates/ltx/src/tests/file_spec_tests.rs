use proptest::prelude::*;
use rand::RngCore;

use crate::tests::database_checksum;
use crate::{Checksum, FileSpec, Header, PageHeader, PageSpec, Trailer, Txid, VERSION};

#[test]
fn snapshot_round_trip() {
    let mut rng = rand::thread_rng();
    let pages: Vec<PageSpec> = (1u32..=5)
        .map(|pgno| {
            let mut data = vec![0u8; 512];
            rng.fill_bytes(&mut data);
            PageSpec {
                header: PageHeader { pgno },
                data,
            }
        })
        .collect();
    let page_refs: Vec<(u32, &[u8])> = pages
        .iter()
        .map(|p| (p.header.pgno, p.data.as_slice()))
        .collect();

    let post_apply_checksum = database_checksum(&page_refs);
    let mut spec = FileSpec {
        header: Header {
            version: VERSION,
            page_size: 512,
            commit: 5,
            min_txid: Txid(1),
            max_txid: Txid(3),
            timestamp: 1000,
            ..Header::default()
        },
        pages,
        trailer: Trailer {
            post_apply_checksum,
            ..Trailer::default()
        },
    };

    let mut buf = Vec::new();
    let written = spec.write_to(&mut buf).unwrap();
    assert_eq!(written, buf.len() as u64);

    // write_to resolves the file checksum back into the spec.
    assert!(spec.trailer.file_checksum.is_flagged());

    let mut other = FileSpec::default();
    let read = other.read_from(buf.as_slice()).unwrap();
    assert_eq!(read, buf.len() as u64);
    assert_eq!(other, spec);
}

/// Strategy for a valid non-snapshot file spec: distinct ascending page
/// numbers, arbitrary page data, and well-formed checksums.
fn non_snapshot_spec() -> impl Strategy<Value = FileSpec> {
    (
        prop::collection::btree_set(1u32..=32, 1..8),
        2u64..1_000,
        0u64..1_000,
        1u64..u64::MAX >> 1,
        1u64..u64::MAX >> 1,
        any::<u8>(),
    )
        .prop_map(|(pgnos, min_txid, txid_span, pre, post, fill)| {
            let commit = *pgnos.iter().max().unwrap();
            let pages: Vec<PageSpec> = pgnos
                .into_iter()
                .map(|pgno| PageSpec {
                    header: PageHeader { pgno },
                    data: vec![fill; 512],
                })
                .collect();

            FileSpec {
                header: Header {
                    version: VERSION,
                    page_size: 512,
                    commit,
                    min_txid: Txid(min_txid),
                    max_txid: Txid(min_txid + txid_span),
                    timestamp: 1000,
                    pre_apply_checksum: Checksum::FLAG | pre,
                    ..Header::default()
                },
                pages,
                trailer: Trailer {
                    post_apply_checksum: Checksum::FLAG | post,
                    ..Trailer::default()
                },
            }
        })
}

proptest! {
    /// Any valid file spec survives an encode/decode round trip intact,
    /// including the resolved file checksum.
    #[test]
    fn round_trip(mut spec in non_snapshot_spec()) {
        let mut buf = Vec::new();
        spec.write_to(&mut buf).unwrap();

        let mut other = FileSpec::default();
        other.read_from(buf.as_slice()).unwrap();
        prop_assert_eq!(other, spec);
    }

    /// Flipping any single byte of an encoded file makes it fail
    /// verification somewhere: decode, checksum, or field validation.
    #[test]
    fn corruption_detected(mut spec in non_snapshot_spec(), flip in any::<prop::sample::Index>()) {
        let mut buf = Vec::new();
        spec.write_to(&mut buf).unwrap();

        let i = flip.index(buf.len());
        buf[i] ^= 0xff;

        let mut other = FileSpec::default();
        prop_assert!(other.read_from(buf.as_slice()).is_err());
    }
}
