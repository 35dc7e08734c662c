//! Streaming decoder and verifier for LTX files.

use std::io::{Read, Write};
use std::mem;

use crc::Digest;
use lz4_flex::frame::FrameDecoder;

use crate::checksum::{checksum_page, new_digest, seal};
use crate::{
    lock_pgno, Checksum, Error, Header, PageHeader, Pos, Result, State, Trailer, CHECKSUM_SIZE,
    HEADER_FLAG_COMPRESS_LZ4, HEADER_SIZE, PAGE_HEADER_SIZE, TRAILER_CHECKSUM_OFFSET, TRAILER_SIZE,
};

/// Read half of the page block: the raw source, or an LZ4 framed stream
/// wrapped around it while the compressed page block is being read.
enum Source<R: Read> {
    Plain(R),
    Lz4(FrameDecoder<R>),
}

impl<R: Read> Read for Source<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Source::Plain(r) => r.read(buf),
            Source::Lz4(r) => r.read(buf),
        }
    }
}

/// Reads an LTX file from a byte source, validating structure and
/// checksums as it goes.
///
/// Drive it in order: [`Decoder::decode_header`], then
/// [`Decoder::decode_page`] until it returns `Ok(None)`, then
/// [`Decoder::close`], which verifies the trailer checksums. A file is
/// only known to be intact once `close` returns successfully.
pub struct Decoder<R: Read> {
    src: Option<Source<R>>,
    state: State,

    header: Header,
    trailer: Trailer,

    /// Rolling post-apply checksum, recomputed while decoding snapshots.
    chksum: Checksum,
    digest: Digest<'static, u64>,
    page_n: usize,
    n: u64,
}

impl<R: Read> Decoder<R> {
    /// Returns a new decoder reading from `r`.
    pub fn new(r: R) -> Decoder<R> {
        Decoder {
            src: Some(Source::Plain(r)),
            state: State::Header,
            header: Header::default(),
            trailer: Trailer::default(),
            chksum: Checksum::FLAG,
            digest: new_digest(),
            page_n: 0,
            n: 0,
        }
    }

    /// Returns the number of bytes read.
    #[must_use]
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Returns the number of pages read.
    #[must_use]
    pub fn page_n(&self) -> usize {
        self.page_n
    }

    /// Returns a copy of the header.
    #[must_use]
    pub fn header(&self) -> Header {
        self.header
    }

    /// Returns a copy of the trailer. Valid after [`Decoder::close`].
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

    /// Reads and validates the file's header frame. Call
    /// [`Decoder::header`] to retrieve it afterwards.
    pub fn decode_header(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Err(Error::DecoderClosed);
        } else if self.state != State::Header {
            return Err(Error::InvalidState {
                op: "decode header frame",
                state: self.state,
            });
        }

        let mut b = [0u8; HEADER_SIZE];
        self.read_exact(&mut b)?;
        self.header = Header::decode(&b)?;

        self.write_to_digest(&b);
        self.state = State::Page;

        self.header.validate()?;

        // Interpose the LZ4 stream for the page block if the file is
        // compressed.
        if self.header.flags & HEADER_FLAG_COMPRESS_LZ4 != 0 {
            match self.src.take() {
                Some(Source::Plain(r)) => self.src = Some(Source::Lz4(FrameDecoder::new(r))),
                other => self.src = other,
            }
        }

        Ok(())
    }

    /// Reads the next page frame into `data`, returning its header, or
    /// `Ok(None)` at the end of the page block.
    ///
    /// `data` must be exactly one page long. While decoding a snapshot the
    /// decoder folds each page into a running post-apply checksum, which
    /// [`Decoder::close`] verifies against the trailer.
    pub fn decode_page(&mut self, data: &mut [u8]) -> Result<Option<PageHeader>> {
        if self.state == State::Closed {
            return Err(Error::DecoderClosed);
        } else if self.state == State::Close {
            return Ok(None);
        } else if self.state != State::Page {
            return Err(Error::InvalidState {
                op: "read page header",
                state: self.state,
            });
        } else if data.len() as u32 != self.header.page_size {
            return Err(Error::format(format!(
                "invalid page buffer size: {}, expecting {}",
                data.len(),
                self.header.page_size
            )));
        }

        let mut b = [0u8; PAGE_HEADER_SIZE];
        self.read_exact(&mut b)?;
        let hdr = PageHeader::decode(&b)?;
        self.write_to_digest(&b);

        // An empty page header ends the page block.
        if hdr.is_zero() {
            // Read off the LZ4 end frame so the underlying source is
            // positioned at the trailer, then drop the compressed reader.
            match self.src.take() {
                Some(Source::Lz4(mut zr)) => {
                    if zr.read(&mut [0u8; 1])? != 0 {
                        return Err(Error::format("expected lz4 end frame"));
                    }
                    self.src = Some(Source::Plain(zr.into_inner()));
                }
                other => self.src = other,
            }

            self.state = State::Close;
            return Ok(None);
        }

        hdr.validate()?;

        self.read_exact(data)?;
        self.write_to_digest(data);
        self.page_n += 1;

        // Recompute the post-apply checksum while decoding snapshots.
        if self.header.is_snapshot() && hdr.pgno != lock_pgno(self.header.page_size) {
            self.chksum = Checksum::FLAG | (self.chksum ^ checksum_page(hdr.pgno, data));
        }

        Ok(Some(hdr))
    }

    /// Reads the trailer and verifies the file against it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] if the running file checksum
    /// disagrees with the trailer, and
    /// [`Error::PostApplyChecksumMismatch`] if a snapshot's recomputed
    /// rolling checksum disagrees with the trailer's post-apply checksum.
    ///
    /// Calling close on an already-closed decoder is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        } else if self.state != State::Close {
            return Err(Error::InvalidState {
                op: "close",
                state: self.state,
            });
        }

        let mut b = [0u8; TRAILER_SIZE];
        self.read_exact(&mut b)?;
        self.trailer = Trailer::decode(&b)?;

        // The file checksum covers everything up to its own field.
        self.write_to_digest(&b[..TRAILER_CHECKSUM_OFFSET]);
        self.n += CHECKSUM_SIZE as u64;

        let chksum = seal(mem::replace(&mut self.digest, new_digest()).finalize());
        if chksum != self.trailer.file_checksum {
            return Err(Error::ChecksumMismatch);
        }

        if self.header.is_snapshot() && self.trailer.post_apply_checksum != self.chksum {
            return Err(Error::PostApplyChecksumMismatch {
                trailer: self.trailer.post_apply_checksum,
                calculated: self.chksum,
            });
        }

        self.state = State::Closed;
        Ok(())
    }

    /// Reads the entire file, discarding page contents. Header and trailer
    /// are available afterwards via their accessors.
    pub fn verify(&mut self) -> Result<()> {
        self.decode_header()?;

        let mut data = vec![0u8; self.header.page_size as usize];
        while self.decode_page(&mut data)?.is_some() {}

        self.close()
    }

    /// Decodes a snapshot LTX file into the SQLite database image it
    /// represents, writing pages `1..=commit` to `w` in order. The lock
    /// page, absent from the LTX file, is written as zeros.
    pub fn decode_database_to<W: Write>(&mut self, mut w: W) -> Result<()> {
        self.decode_header()?;

        let hdr = self.header;
        let lock_pgno = hdr.lock_pgno();
        if !hdr.is_snapshot() {
            return Err(Error::format(
                "cannot decode non-snapshot LTX file to SQLite database",
            ));
        }

        let mut data = vec![0u8; hdr.page_size as usize];
        for pgno in 1..=hdr.commit {
            if pgno == lock_pgno {
                data.fill(0);
            } else {
                match self.decode_page(&mut data)? {
                    Some(page_hdr) if page_hdr.pgno == pgno => {}
                    Some(page_hdr) => {
                        return Err(Error::format(format!(
                            "unexpected pgno while decoding page: read {}, expected {}",
                            page_hdr.pgno, pgno
                        )));
                    }
                    None => {
                        return Err(Error::format(format!(
                            "unexpected end of page block, expected page {}",
                            pgno
                        )));
                    }
                }
            }

            w.write_all(&data)?;
        }

        // One more read must report the end of the page block so the
        // decoder can close and validate.
        if let Some(page_hdr) = self.decode_page(&mut data)? {
            return Err(Error::format(format!(
                "unexpected page {} after commit {}",
                page_hdr.pgno, hdr.commit
            )));
        }

        self.close()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match &mut self.src {
            Some(src) => src.read_exact(buf)?,
            None => return Err(Error::DecoderClosed),
        }
        Ok(())
    }

    fn write_to_digest(&mut self, b: &[u8]) {
        self.digest.update(b);
        self.n += b.len() as u64;
    }
}
