//! Streaming encoder for LTX files.

use std::io::{self, Write};
use std::mem;

use crc::Digest;
use lz4_flex::frame::FrameEncoder;

use crate::checksum::{new_digest, seal};
use crate::{
    lock_pgno, Checksum, Error, Header, PageHeader, Pos, Result, State, Trailer, CHECKSUM_SIZE,
    HEADER_FLAG_COMPRESS_LZ4, TRAILER_CHECKSUM_OFFSET,
};

/// Write half of the page block: either the raw sink or an LZ4 framed
/// stream wrapped around it when the header carries the compression flag.
enum Sink<W: Write> {
    Plain(W),
    Lz4(FrameEncoder<W>),
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Lz4(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Lz4(w) => w.flush(),
        }
    }
}

/// Writes an LTX file to a byte sink as a strict sequence of states:
/// header, then sorted pages, then the sealing trailer.
///
/// The encoder owns the sink for its lifetime and maintains the running
/// file checksum as a side effect of every write. [`Encoder::close`] is
/// mandatory; without it the file has no trailer and will not verify.
///
/// ```rust,no_run
/// # use ltx::{Checksum, Encoder, Header, PageHeader, Txid};
/// let mut enc = Encoder::new(Vec::new());
/// enc.encode_header(Header {
///     version: ltx::VERSION,
///     page_size: 4096,
///     commit: 1,
///     min_txid: Txid(1),
///     max_txid: Txid(1),
///     ..Header::default()
/// })?;
/// let page = vec![0u8; 4096];
/// enc.encode_page(PageHeader { pgno: 1 }, &page)?;
/// enc.set_post_apply_checksum(ltx::checksum_page(1, &page));
/// enc.close()?;
/// # Ok::<(), ltx::Error>(())
/// ```
pub struct Encoder<W: Write> {
    sink: Option<Sink<W>>,
    state: State,

    header: Header,
    trailer: Trailer,
    digest: Digest<'static, u64>,
    n: u64,

    prev_pgno: u32,
}

impl<W: Write> Encoder<W> {
    /// Returns a new encoder writing to `w`.
    pub fn new(w: W) -> Encoder<W> {
        Encoder {
            sink: Some(Sink::Plain(w)),
            state: State::Header,
            header: Header::default(),
            trailer: Trailer::default(),
            digest: new_digest(),
            n: 0,
            prev_pgno: 0,
        }
    }

    /// Returns the number of bytes written.
    #[must_use]
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Returns a copy of the header.
    #[must_use]
    pub fn header(&self) -> Header {
        self.header
    }

    /// Returns a copy of the trailer. The file checksum is only available
    /// after [`Encoder::close`].
    #[must_use]
    pub fn trailer(&self) -> Trailer {
        self.trailer
    }

    /// Returns the replication position after this file is applied. Only
    /// valid after a successful close.
    #[must_use]
    pub fn post_apply_pos(&self) -> Pos {
        Pos {
            txid: self.header.max_txid,
            post_apply_checksum: self.trailer.post_apply_checksum,
        }
    }

    /// Sets the rolling checksum of the database after this file applies.
    /// Must be called before [`Encoder::close`].
    pub fn set_post_apply_checksum(&mut self, chksum: Checksum) {
        self.trailer.post_apply_checksum = chksum;
    }

    /// Validates `hdr` and writes it as the file's header frame, seeding
    /// the running file checksum. If the header carries
    /// [`HEADER_FLAG_COMPRESS_LZ4`], all page writes up to the trailer are
    /// routed through an LZ4 framed stream; the file checksum still
    /// observes the uncompressed bytes.
    pub fn encode_header(&mut self, hdr: Header) -> Result<()> {
        if self.state == State::Closed {
            return Err(Error::EncoderClosed);
        } else if self.state != State::Header {
            return Err(Error::InvalidState {
                op: "encode header frame",
                state: self.state,
            });
        }
        hdr.validate()?;

        self.header = hdr;

        let b = self.header.encode();
        self.write(&b)?;

        // Wrap the sink for the page block if compression is requested.
        if self.header.flags & HEADER_FLAG_COMPRESS_LZ4 != 0 {
            match self.sink.take() {
                Some(Sink::Plain(w)) => self.sink = Some(Sink::Lz4(FrameEncoder::new(w))),
                other => self.sink = other,
            }
        }

        self.state = State::Page;
        Ok(())
    }

    /// Writes a page frame to the file's page block.
    ///
    /// Pages must be sorted: snapshots are strictly sequential starting at
    /// page 1 (skipping only the lock page), other files strictly
    /// increasing. The lock page itself is never written.
    pub fn encode_page(&mut self, hdr: PageHeader, data: &[u8]) -> Result<()> {
        if self.state == State::Closed {
            return Err(Error::EncoderClosed);
        } else if self.state != State::Page {
            return Err(Error::InvalidState {
                op: "encode page header",
                state: self.state,
            });
        } else if hdr.pgno > self.header.commit {
            return Err(Error::format(format!(
                "page number {} out-of-bounds for commit size {}",
                hdr.pgno, self.header.commit
            )));
        }
        hdr.validate()?;
        if data.len() as u32 != self.header.page_size {
            return Err(Error::format(format!(
                "invalid page buffer size: {}, expecting {}",
                data.len(),
                self.header.page_size
            )));
        }

        let lock_pgno = lock_pgno(self.header.page_size);
        if hdr.pgno == lock_pgno {
            return Err(Error::format(format!(
                "cannot encode lock page: pgno={}",
                hdr.pgno
            )));
        }

        // Snapshots must start at page 1 and cover every page up to the
        // commit size; other files may skip pages but stay ordered.
        if self.header.is_snapshot() {
            if self.prev_pgno == 0 && hdr.pgno != 1 {
                return Err(Error::format(
                    "snapshot transaction file must start with page number 1",
                ));
            }
            if self.prev_pgno == lock_pgno - 1 {
                if hdr.pgno != self.prev_pgno + 2 {
                    return Err(Error::format(format!(
                        "nonsequential page numbers in snapshot transaction (skip lock page): {},{}",
                        self.prev_pgno, hdr.pgno
                    )));
                }
            } else if self.prev_pgno != 0 && hdr.pgno != self.prev_pgno + 1 {
                return Err(Error::format(format!(
                    "nonsequential page numbers in snapshot transaction: {},{}",
                    self.prev_pgno, hdr.pgno
                )));
            }
        } else if self.prev_pgno >= hdr.pgno {
            return Err(Error::format(format!(
                "out-of-order page numbers: {},{}",
                self.prev_pgno, hdr.pgno
            )));
        }

        let b = hdr.encode();
        self.write(&b)?;
        self.write(data)?;

        self.prev_pgno = hdr.pgno;
        Ok(())
    }

    /// Terminates the page block, flushes any compression stream, computes
    /// the final file checksum, and writes the trailer.
    ///
    /// Calling close on an already-closed encoder is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        } else if self.state != State::Page {
            return Err(Error::InvalidState {
                op: "close",
                state: self.state,
            });
        }

        // Empty page header marks the end of the page block.
        let b = PageHeader::default().encode();
        self.write(&b)?;

        // Finish the compression stream, if in use, and revert to the
        // plain sink for the trailer.
        let w = match self.sink.take() {
            Some(Sink::Lz4(zw)) => zw.finish().map_err(io::Error::from)?,
            Some(Sink::Plain(w)) => w,
            None => return Err(Error::EncoderClosed),
        };
        self.sink = Some(Sink::Plain(w));

        // The file checksum covers the trailer bytes up to its own field.
        let b = self.trailer.encode();
        self.write_to_digest(&b[..TRAILER_CHECKSUM_OFFSET]);
        self.trailer.file_checksum = seal(mem::replace(&mut self.digest, new_digest()).finalize());

        self.trailer.validate()?;

        // A deletion file erases the database, so its post-apply state is
        // the empty-database checksum.
        if self.header.commit == 0 && self.trailer.post_apply_checksum != Checksum::FLAG {
            return Err(Error::format(
                "post-apply checksum must be empty for zero-length database",
            ));
        }

        // Re-encode with the final checksum; the digest has already
        // observed its share of the trailer.
        let b = self.trailer.encode();
        if let Some(sink) = &mut self.sink {
            sink.write_all(&b)?;
        }
        self.n += CHECKSUM_SIZE as u64;

        self.state = State::Closed;
        Ok(())
    }

    /// Writes to the current sink and folds the bytes into the file
    /// checksum.
    fn write(&mut self, b: &[u8]) -> Result<()> {
        match &mut self.sink {
            Some(sink) => sink.write_all(b)?,
            None => return Err(Error::EncoderClosed),
        }
        self.write_to_digest(b);
        Ok(())
    }

    fn write_to_digest(&mut self, b: &[u8]) {
        self.digest.update(b);
        self.n += b.len() as u64;
    }
}
