//! # LTX - Lite Transaction files
//!
//! Reads, writes, and compacts LTX files: a binary container recording a
//! transaction (or a contiguous range of transactions) against a
//! page-oriented SQLite database. A file is either a full snapshot
//! (starting at transaction 1) or an incremental set of changed pages, and
//! is self-verifying via embedded checksums.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER (100 bytes, big-endian)                                │
//! │                                                               │
//! │ magic "LTX1" | flags (u32) | page_size (u32) | commit (u32)   │
//! │ min_txid (u64) | max_txid (u64) | timestamp (i64, epoch ms)   │
//! │ pre_apply_checksum (u64) | wal_offset (i64) | wal_size (i64)  │
//! │ wal_salt1 (u32) | wal_salt2 (u32) | node_id (u64)             │
//! │ reserved (20 bytes, zero)                                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ PAGE BLOCK (optionally LZ4-framed when flag 0x1 is set)       │
//! │                                                               │
//! │ pgno (u32) | page data (page_size bytes)                      │
//! │                                                               │
//! │ ... repeated, sorted by pgno, terminated by pgno == 0 ...     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ TRAILER (16 bytes, always uncompressed)                       │
//! │                                                               │
//! │ post_apply_checksum (u64) | file_checksum (u64)               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The file checksum is CRC64-ISO over every byte up to (but not including)
//! the trailer's `file_checksum` field. The pre/post-apply checksums are
//! rolling database checksums: an XOR fold of [`checksum_page`] across all
//! live pages, sealed with [`Checksum::FLAG`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use ltx::{Checksum, Encoder, Header, PageHeader};
//!
//! let file = std::fs::File::create("0000000000000001-0000000000000001.ltx").unwrap();
//! let mut enc = Encoder::new(file);
//! enc.encode_header(Header {
//!     version: ltx::VERSION,
//!     page_size: 4096,
//!     commit: 1,
//!     min_txid: ltx::Txid(1),
//!     max_txid: ltx::Txid(1),
//!     ..Header::default()
//! }).unwrap();
//! let page = vec![0u8; 4096];
//! enc.encode_page(PageHeader { pgno: 1 }, &page).unwrap();
//! enc.set_post_apply_checksum(Checksum::FLAG | ltx::checksum_page(1, &page));
//! enc.close().unwrap();
//! ```

use std::fmt;
use std::io::{self, Read};
use std::ops::{BitOr, BitXor};
use std::str::FromStr;
use std::sync::LazyLock;

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

mod checksum;
mod compactor;
mod decoder;
mod encoder;
mod file_spec;

pub use checksum::{checksum_page, checksum_pages, checksum_reader};
pub use compactor::Compactor;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use file_spec::{FileSpec, PageSpec};

/// Magic identifying an LTX file, stored as its first four bytes.
pub const MAGIC: &[u8; 4] = b"LTX1";

/// Current version of the LTX file format.
pub const VERSION: u32 = 1;

/// Size of the fixed header frame, in bytes.
pub const HEADER_SIZE: usize = 100;

/// Size of a single page header, in bytes.
pub const PAGE_HEADER_SIZE: usize = 4;

/// Size of the fixed trailer frame, in bytes.
pub const TRAILER_SIZE: usize = 16;

/// Size of a serialized checksum, in bytes.
pub const CHECKSUM_SIZE: usize = 8;

/// Offset of the file checksum within the trailer.
pub const TRAILER_CHECKSUM_OFFSET: usize = TRAILER_SIZE - CHECKSUM_SIZE;

/// Mask of all defined header flag bits.
pub const HEADER_FLAG_MASK: u32 = 0x0000_0001;

/// Header flag: the page block is wrapped in an LZ4 framed stream.
pub const HEADER_FLAG_COMPRESS_LZ4: u32 = 0x0000_0001;

/// Byte offset of the SQLite "pending byte" lock.
pub const PENDING_BYTE: u32 = 0x4000_0000;

/// Maximum allowed page size for SQLite.
pub const MAX_PAGE_SIZE: u32 = 65536;

/// Minimum allowed page size for SQLite.
pub const MIN_PAGE_SIZE: u32 = 512;

/// Errors returned by the LTX encoder, decoder, and compactor.
#[derive(Debug, Error)]
pub enum Error {
    /// The first four bytes of the input are not the LTX magic.
    #[error("invalid LTX file")]
    InvalidFile,

    /// A decode target was smaller than the fixed record size.
    #[error("short buffer")]
    ShortBuffer,

    /// A method was invoked on an encoder that has already been closed.
    #[error("ltx encoder closed")]
    EncoderClosed,

    /// A method was invoked on a decoder that has already been closed.
    #[error("ltx decoder closed")]
    DecoderClosed,

    /// A method was invoked in a state other than the one it requires.
    /// Carries the state the object is currently in.
    #[error("cannot {op}, expected {state}")]
    InvalidState { op: &'static str, state: State },

    /// The trailer's file checksum does not match the checksum of the bytes
    /// actually read or written.
    #[error("file checksum mismatch")]
    ChecksumMismatch,

    /// A snapshot's recomputed rolling checksum differs from the trailer's
    /// post-apply checksum.
    #[error("post-apply checksum in trailer ({trailer}) does not match calculated checksum ({calculated})")]
    PostApplyChecksumMismatch {
        trailer: Checksum,
        calculated: Checksum,
    },

    /// An LTX file is not contiguous with the current database position.
    #[error("ltx position mismatch ({0})")]
    PosMismatch(Pos),

    /// Compaction was canceled via its cancellation flag.
    #[error("operation canceled")]
    Canceled,

    /// A field-level validation failure; the message carries the detail.
    #[error("{0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Error {
        Error::Format(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Position of an encoder or decoder within an LTX file.
///
/// Both state machines advance strictly forward: `Header` → `Page` →
/// `Close` → `Closed`. Methods called out of order return
/// [`Error::InvalidState`] carrying the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Header,
    Page,
    Close,
    Closed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Header => write!(f, "header"),
            State::Page => write!(f, "page"),
            State::Close => write!(f, "close"),
            State::Closed => write!(f, "closed"),
        }
    }
}

/// A transaction ID.
///
/// 64-bit, formatted as 16 lowercase hex digits. Zero is reserved as
/// "unset"; 1 marks the genesis transaction, so a file with
/// `min_txid == 1` is a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Txid(pub u64);

impl Txid {
    /// Parses a 16-character lowercase hex string into a transaction ID.
    pub fn parse(s: &str) -> Result<Txid> {
        if s.len() != 16 {
            return Err(Error::format(format!(
                "invalid formatted transaction id length: {:?}",
                s
            )));
        }
        u64::from_str_radix(s, 16)
            .map(Txid)
            .map_err(|_| Error::format(format!("invalid transaction id format: {:?}", s)))
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Txid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Txid::parse(s)
    }
}

impl Serialize for Txid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Txid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(deserializer)
            .map_err(|_| D::Error::custom("cannot unmarshal TXID from JSON value"))?;
        match s {
            None => Ok(Txid(0)),
            Some(s) => Txid::parse(&s)
                .map_err(|_| D::Error::custom(format!("cannot parse TXID from JSON string: {:?}", s))),
        }
    }
}

/// An LTX checksum.
///
/// Every non-zero checksum carries [`Checksum::FLAG`] in its most
/// significant bit so that a legitimate value can never collide with the
/// "unset" value zero. A value with the high bit clear (other than zero)
/// is an invalid checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Checksum(pub u64);

impl Checksum {
    /// The sentinel bit set on every non-zero LTX checksum. Also the
    /// rolling checksum of an empty database.
    pub const FLAG: Checksum = Checksum(1 << 63);

    /// Parses a 16-character lowercase hex string into a checksum.
    pub fn parse(s: &str) -> Result<Checksum> {
        if s.len() != 16 {
            return Err(Error::format(format!(
                "invalid formatted checksum length: {:?}",
                s
            )));
        }
        u64::from_str_radix(s, 16)
            .map(Checksum)
            .map_err(|_| Error::format(format!("invalid checksum format: {:?}", s)))
    }

    /// Returns true if the checksum is the "unset" value.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the sentinel bit is set.
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.0 & Checksum::FLAG.0 != 0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Checksum::parse(s)
    }
}

impl BitOr for Checksum {
    type Output = Checksum;

    fn bitor(self, rhs: Checksum) -> Checksum {
        Checksum(self.0 | rhs.0)
    }
}

impl BitOr<u64> for Checksum {
    type Output = Checksum;

    fn bitor(self, rhs: u64) -> Checksum {
        Checksum(self.0 | rhs)
    }
}

impl BitXor for Checksum {
    type Output = Checksum;

    fn bitxor(self, rhs: Checksum) -> Checksum {
        Checksum(self.0 ^ rhs.0)
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(deserializer)
            .map_err(|_| D::Error::custom("cannot unmarshal checksum from JSON value"))?;
        match s {
            None => Ok(Checksum(0)),
            Some(s) => Checksum::parse(&s).map_err(|_| {
                D::Error::custom(format!("cannot parse checksum from JSON string: {:?}", s))
            }),
        }
    }
}

/// The transactional position of a database: the state *after*
/// `txid` has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pos {
    pub txid: Txid,
    pub post_apply_checksum: Checksum,
}

impl Pos {
    #[must_use]
    pub fn new(txid: Txid, post_apply_checksum: Checksum) -> Pos {
        Pos {
            txid,
            post_apply_checksum,
        }
    }

    /// Parses a position from its 33-character `TXID/CHECKSUM` form.
    pub fn parse(s: &str) -> Result<Pos> {
        if s.len() != 33 || s.as_bytes()[16] != b'/' {
            return Err(Error::format(format!(
                "invalid formatted position length: {:?}",
                s
            )));
        }
        Ok(Pos {
            txid: Txid::parse(&s[..16])?,
            post_apply_checksum: Checksum::parse(&s[17..])?,
        })
    }

    /// Returns true if the position is empty.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Pos::default()
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.txid, self.post_apply_checksum)
    }
}

impl FromStr for Pos {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pos::parse(s)
    }
}

/// The header frame of an LTX file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Format version, derived from the magic on decode.
    pub version: u32,
    /// Flag bits; only [`HEADER_FLAG_COMPRESS_LZ4`] is currently defined.
    pub flags: u32,
    /// Page size in bytes; a power of two in [512, 65536].
    pub page_size: u32,
    /// Database size, in pages, after this transaction applies. Zero means
    /// the transaction deleted the database.
    pub commit: u32,
    /// Minimum transaction ID covered by this file.
    pub min_txid: Txid,
    /// Maximum transaction ID covered by this file.
    pub max_txid: Txid,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Rolling checksum of the database before this file applies. Zero on
    /// snapshots.
    pub pre_apply_checksum: Checksum,
    /// File offset from the original WAL; zero if journal.
    pub wal_offset: i64,
    /// Size of the original WAL segment; zero if journal.
    pub wal_size: i64,
    /// Header salt-1 from the original WAL; zero if journal or compaction.
    pub wal_salt1: u32,
    /// Header salt-2 from the original WAL; zero if journal or compaction.
    pub wal_salt2: u32,
    /// Node where the file was created; zero if unset.
    pub node_id: u64,
}

impl Header {
    /// Returns true if the file is a complete database snapshot. Snapshots
    /// start at the genesis transaction and must include every live page.
    #[must_use]
    pub fn is_snapshot(&self) -> bool {
        self.min_txid == Txid(1)
    }

    /// Returns the lock page number for this header's page size.
    #[must_use]
    pub fn lock_pgno(&self) -> u32 {
        lock_pgno(self.page_size)
    }

    /// Returns the replication position before this file applies.
    #[must_use]
    pub fn pre_apply_pos(&self) -> Pos {
        Pos {
            txid: Txid(self.min_txid.0.wrapping_sub(1)),
            post_apply_checksum: self.pre_apply_checksum,
        }
    }

    /// Validates the header fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] naming the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.version != VERSION {
            return Err(Error::format("invalid version"));
        }
        if !is_valid_header_flags(self.flags) {
            return Err(Error::format(format!("invalid flags: {:#010x}", self.flags)));
        }
        if !is_valid_page_size(self.page_size) {
            return Err(Error::format(format!("invalid page size: {}", self.page_size)));
        }
        if self.min_txid.0 == 0 {
            return Err(Error::format("minimum transaction id required"));
        }
        if self.max_txid.0 == 0 {
            return Err(Error::format("maximum transaction id required"));
        }
        if self.min_txid > self.max_txid {
            return Err(Error::format(format!(
                "transaction ids out of order: ({},{})",
                self.min_txid.0, self.max_txid.0
            )));
        }

        if self.wal_offset < 0 {
            return Err(Error::format(format!(
                "wal offset cannot be negative: {}",
                self.wal_offset
            )));
        }
        if self.wal_size < 0 {
            return Err(Error::format(format!(
                "wal size cannot be negative: {}",
                self.wal_size
            )));
        }

        if self.wal_salt1 != 0 || self.wal_salt2 != 0 {
            if self.wal_offset == 0 {
                return Err(Error::format("wal offset required if salt exists"));
            }
            if self.wal_size == 0 {
                return Err(Error::format("wal size required if salt exists"));
            }
        }

        if self.wal_offset != 0 && self.wal_size == 0 {
            return Err(Error::format("wal size required if wal offset exists"));
        }
        if self.wal_offset == 0 && self.wal_size != 0 {
            return Err(Error::format("wal offset required if wal size exists"));
        }

        // Snapshots include every page of the database, so there is no
        // previous state for a pre-apply checksum to describe.
        if self.is_snapshot() {
            if !self.pre_apply_checksum.is_zero() {
                return Err(Error::format("pre-apply checksum must be zero on snapshots"));
            }
        } else {
            if self.pre_apply_checksum.is_zero() {
                return Err(Error::format(
                    "pre-apply checksum required on non-snapshot files",
                ));
            }
            if !self.pre_apply_checksum.is_flagged() {
                return Err(Error::format("invalid pre-apply checksum format"));
            }
        }

        Ok(())
    }

    /// Encodes the header to its fixed 100-byte big-endian form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut b = [0u8; HEADER_SIZE];
        b[0..4].copy_from_slice(MAGIC);
        BigEndian::write_u32(&mut b[4..8], self.flags);
        BigEndian::write_u32(&mut b[8..12], self.page_size);
        BigEndian::write_u32(&mut b[12..16], self.commit);
        BigEndian::write_u64(&mut b[16..24], self.min_txid.0);
        BigEndian::write_u64(&mut b[24..32], self.max_txid.0);
        BigEndian::write_i64(&mut b[32..40], self.timestamp);
        BigEndian::write_u64(&mut b[40..48], self.pre_apply_checksum.0);
        BigEndian::write_i64(&mut b[48..56], self.wal_offset);
        BigEndian::write_i64(&mut b[56..64], self.wal_size);
        BigEndian::write_u32(&mut b[64..68], self.wal_salt1);
        BigEndian::write_u32(&mut b[68..72], self.wal_salt2);
        BigEndian::write_u64(&mut b[72..80], self.node_id);
        b
    }

    /// Decodes a header from a byte slice.
    ///
    /// The version is derived from the magic, not read from the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShortBuffer`] if `b` is smaller than
    /// [`HEADER_SIZE`] and [`Error::InvalidFile`] on a magic mismatch.
    pub fn decode(b: &[u8]) -> Result<Header> {
        if b.len() < HEADER_SIZE {
            return Err(Error::ShortBuffer);
        }
        if &b[0..4] != MAGIC {
            return Err(Error::InvalidFile);
        }

        Ok(Header {
            version: VERSION,
            flags: BigEndian::read_u32(&b[4..8]),
            page_size: BigEndian::read_u32(&b[8..12]),
            commit: BigEndian::read_u32(&b[12..16]),
            min_txid: Txid(BigEndian::read_u64(&b[16..24])),
            max_txid: Txid(BigEndian::read_u64(&b[24..32])),
            timestamp: BigEndian::read_i64(&b[32..40]),
            pre_apply_checksum: Checksum(BigEndian::read_u64(&b[40..48])),
            wal_offset: BigEndian::read_i64(&b[48..56]),
            wal_size: BigEndian::read_i64(&b[56..64]),
            wal_salt1: BigEndian::read_u32(&b[64..68]),
            wal_salt2: BigEndian::read_u32(&b[68..72]),
            node_id: BigEndian::read_u64(&b[72..80]),
        })
    }
}

/// Reads and decodes the header from `r`, returning a composite reader
/// that prepends the consumed bytes back onto the stream so a downstream
/// consumer can still observe them.
pub fn peek_header<R: Read>(mut r: R) -> Result<(Header, io::Chain<io::Cursor<Vec<u8>>, R>)> {
    let mut buf = vec![0u8; HEADER_SIZE];
    r.read_exact(&mut buf)?;
    let hdr = Header::decode(&buf)?;
    Ok((hdr, io::Cursor::new(buf).chain(r)))
}

/// Returns true unless flag bits outside [`HEADER_FLAG_MASK`] are set.
#[must_use]
pub fn is_valid_header_flags(flags: u32) -> bool {
    flags == flags & HEADER_FLAG_MASK
}

/// Returns true if `sz` is a power of two between 512 and 64K.
#[must_use]
pub fn is_valid_page_size(sz: u32) -> bool {
    sz.is_power_of_two() && (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&sz)
}

/// The header for a single page frame.
///
/// A zero page number marks the end of the page block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PageHeader {
    pub pgno: u32,
}

impl PageHeader {
    /// Returns true if the header is the page-block terminator.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.pgno == 0
    }

    /// Validates the page header.
    pub fn validate(&self) -> Result<()> {
        if self.pgno == 0 {
            return Err(Error::format("page number required"));
        }
        Ok(())
    }

    /// Encodes the page header to its fixed 4-byte big-endian form.
    #[must_use]
    pub fn encode(&self) -> [u8; PAGE_HEADER_SIZE] {
        let mut b = [0u8; PAGE_HEADER_SIZE];
        BigEndian::write_u32(&mut b, self.pgno);
        b
    }

    /// Decodes a page header from a byte slice.
    pub fn decode(b: &[u8]) -> Result<PageHeader> {
        if b.len() < PAGE_HEADER_SIZE {
            return Err(Error::ShortBuffer);
        }
        Ok(PageHeader {
            pgno: BigEndian::read_u32(b),
        })
    }
}

/// The trailer frame sealing an LTX file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Trailer {
    /// Rolling checksum of the database after this file is applied.
    pub post_apply_checksum: Checksum,
    /// CRC64 checksum of the file contents preceding this field.
    pub file_checksum: Checksum,
}

impl Trailer {
    /// Validates the trailer fields.
    pub fn validate(&self) -> Result<()> {
        if self.post_apply_checksum.is_zero() {
            return Err(Error::format("post-apply checksum required"));
        } else if !self.post_apply_checksum.is_flagged() {
            return Err(Error::format("invalid post-apply checksum format"));
        }

        if self.file_checksum.is_zero() {
            return Err(Error::format("file checksum required"));
        } else if !self.file_checksum.is_flagged() {
            return Err(Error::format("invalid file checksum format"));
        }
        Ok(())
    }

    /// Encodes the trailer to its fixed 16-byte big-endian form.
    #[must_use]
    pub fn encode(&self) -> [u8; TRAILER_SIZE] {
        let mut b = [0u8; TRAILER_SIZE];
        BigEndian::write_u64(&mut b[0..8], self.post_apply_checksum.0);
        BigEndian::write_u64(&mut b[8..16], self.file_checksum.0);
        b
    }

    /// Decodes a trailer from a byte slice.
    pub fn decode(b: &[u8]) -> Result<Trailer> {
        if b.len() < TRAILER_SIZE {
            return Err(Error::ShortBuffer);
        }
        Ok(Trailer {
            post_apply_checksum: Checksum(BigEndian::read_u64(&b[0..8])),
            file_checksum: Checksum(BigEndian::read_u64(&b[8..16])),
        })
    }
}

/// Returns the page number holding the SQLite pending-byte lock.
///
/// The lock page is never stored in an LTX file: the encoder refuses it and
/// the decoder materializes it as zeros when rebuilding a database image.
#[must_use]
pub fn lock_pgno(page_size: u32) -> u32 {
    PENDING_BYTE / page_size + 1
}

static FILENAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-f]{16})-([0-9a-f]{16})\.ltx$").expect("valid regex"));

/// Parses the transaction range from an LTX filename of the form
/// `{min_txid:016x}-{max_txid:016x}.ltx`.
pub fn parse_filename(name: &str) -> Result<(Txid, Txid)> {
    let caps = FILENAME_REGEX
        .captures(name)
        .ok_or_else(|| Error::format(format!("invalid ltx filename: {}", name)))?;
    Ok((Txid::parse(&caps[1])?, Txid::parse(&caps[2])?))
}

/// Returns the LTX filename representing a range of transactions.
#[must_use]
pub fn format_filename(min_txid: Txid, max_txid: Txid) -> String {
    format!("{}-{}.ltx", min_txid, max_txid)
}

/// Fixed-width millisecond timestamp format used by LTX. The fixed width
/// keeps formatted timestamps sortable.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Formats `t` with fixed-width millisecond resolution in UTC.
#[must_use]
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a timestamp in the fixed-width millisecond format, falling back
/// to nanosecond RFC 3339 (truncated to milliseconds) to support
/// timestamps from older writers.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT) {
        return Ok(t.and_utc());
    }

    let t = DateTime::parse_from_rfc3339(value)
        .map_err(|_| Error::format(format!("invalid timestamp: {:?}", value)))?;
    DateTime::<Utc>::from_timestamp_millis(t.with_timezone(&Utc).timestamp_millis())
        .ok_or_else(|| Error::format(format!("invalid timestamp: {:?}", value)))
}

#[cfg(test)]
mod tests;
