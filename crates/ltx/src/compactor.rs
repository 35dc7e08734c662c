//! Merges contiguous LTX files into a single equivalent file.
//!
//! Each input decoder yields its pages as a sorted stream. The compactor
//! walks all streams in lockstep, emitting the newest version of each page
//! and dropping pages beyond the final commit size, so the output replays
//! the whole transaction range in one apply while preserving the
//! pre-apply → post-apply checksum chain.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{Decoder, Encoder, Error, Header, PageHeader, Result, Trailer, VERSION};

/// One input file: its decoder plus a one-page lookahead buffer.
struct CompactorInput<R: Read> {
    dec: Decoder<R>,
    /// Pending page header, or `None` when the buffer needs a refill (or
    /// the input is exhausted).
    hdr: Option<PageHeader>,
    data: Vec<u8>,
}

/// Merges a set of chronologically contiguous LTX files into one.
///
/// Inputs are sorted by transaction range; they must share a page size and
/// (unless [`Compactor::allow_non_contiguous_txids`] is set) form an
/// unbroken TXID chain. For every page the newest input wins. The output
/// header spans the full range, and the output trailer carries the last
/// input's post-apply checksum.
pub struct Compactor<W: Write, R: Read> {
    enc: Encoder<W>,
    inputs: Vec<CompactorInput<R>>,

    /// Flag bits for the output header (e.g. to emit a compressed file).
    pub header_flags: u32,
    /// Permit gaps between input transaction ranges.
    pub allow_non_contiguous_txids: bool,
    /// Cooperative cancellation, checked between page merges.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl<W: Write, R: Read> Compactor<W, R> {
    /// Returns a new compactor writing to `w` and reading from `rdrs`.
    pub fn new(w: W, rdrs: Vec<R>) -> Compactor<W, R> {
        Compactor {
            enc: Encoder::new(w),
            inputs: rdrs
                .into_iter()
                .map(|r| CompactorInput {
                    dec: Decoder::new(r),
                    hdr: None,
                    data: Vec::new(),
                })
                .collect(),
            header_flags: 0,
            allow_non_contiguous_txids: false,
            cancel: None,
        }
    }

    /// Returns the header of the compacted file. Only valid after a
    /// successful [`Compactor::compact`].
    #[must_use]
    pub fn header(&self) -> Header {
        self.enc.header()
    }

    /// Returns the trailer of the compacted file. Only valid after a
    /// successful [`Compactor::compact`].
    #[must_use]
    pub fn trailer(&self) -> Trailer {
        self.enc.trailer()
    }

    /// Merges the inputs into the output writer.
    pub fn compact(&mut self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(Error::format("at least one input reader required"));
        }

        for input in &mut self.inputs {
            input.dec.decode_header()?;
        }

        // Order inputs chronologically; later inputs take precedence in
        // the page merge.
        self.inputs.sort_by_key(|input| {
            let hdr = input.dec.header();
            (hdr.min_txid, hdr.max_txid)
        });

        // Inputs must share a page size and form a contiguous chain.
        for pair in self.inputs.windows(2) {
            let prev_hdr = pair[0].dec.header();
            let hdr = pair[1].dec.header();

            if prev_hdr.page_size != hdr.page_size {
                return Err(Error::format(format!(
                    "input files have mismatched page sizes: {} != {}",
                    prev_hdr.page_size, hdr.page_size
                )));
            }
            if !self.allow_non_contiguous_txids && prev_hdr.max_txid.0 + 1 != hdr.min_txid.0 {
                return Err(Error::format(format!(
                    "non-contiguous transaction ids in input files: ({},{}) -> ({},{})",
                    prev_hdr.min_txid, prev_hdr.max_txid, hdr.min_txid, hdr.max_txid
                )));
            }
        }

        let min_hdr = self.inputs[0].dec.header();
        let max_hdr = self.inputs[self.inputs.len() - 1].dec.header();

        // The output spans the full range: size and post-state from the
        // newest input, pre-state and timestamp from the oldest. The node
        // id is not meaningful after compaction and is left unset.
        self.enc.encode_header(Header {
            version: VERSION,
            flags: self.header_flags,
            page_size: min_hdr.page_size,
            commit: max_hdr.commit,
            min_txid: min_hdr.min_txid,
            max_txid: max_hdr.max_txid,
            timestamp: min_hdr.timestamp,
            pre_apply_checksum: min_hdr.pre_apply_checksum,
            ..Header::default()
        })?;

        self.write_page_block()?;

        // Close the decoders so their integrity checks run.
        for input in &mut self.inputs {
            input.dec.close()?;
        }

        let post_apply_checksum = self.inputs[self.inputs.len() - 1]
            .dec
            .trailer()
            .post_apply_checksum;
        self.enc.set_post_apply_checksum(post_apply_checksum);
        self.enc.close()?;

        Ok(())
    }

    fn write_page_block(&mut self) -> Result<()> {
        let page_size = self.enc.header().page_size as usize;
        for input in &mut self.inputs {
            input.data = vec![0u8; page_size];
        }

        loop {
            if let Some(cancel) = &self.cancel {
                if cancel.load(Ordering::Relaxed) {
                    return Err(Error::Canceled);
                }
            }

            let pgno = self.fill_page_buffers()?;
            if pgno == 0 {
                return Ok(()); // all inputs exhausted
            }

            self.write_page_buffers(pgno)?;
        }
    }

    /// Refills each empty input buffer with its next page and returns the
    /// lowest pending page number, or zero when every input is exhausted.
    fn fill_page_buffers(&mut self) -> Result<u32> {
        let mut pgno = 0u32;
        for input in &mut self.inputs {
            if input.hdr.is_none() {
                input.hdr = input.dec.decode_page(&mut input.data)?;
            }

            if let Some(hdr) = input.hdr {
                if pgno == 0 || hdr.pgno < pgno {
                    pgno = hdr.pgno;
                }
            }
        }
        Ok(pgno)
    }

    /// Emits `pgno` from the newest input holding it and clears every
    /// input's matching buffer.
    fn write_page_buffers(&mut self, pgno: u32) -> Result<()> {
        let commit = self.enc.header().commit;

        let mut page_written = false;
        for i in (0..self.inputs.len()).rev() {
            let Some(hdr) = self.inputs[i].hdr else {
                continue;
            };
            if hdr.pgno != pgno {
                continue;
            }

            // Consume the buffer whether or not this copy is emitted;
            // older copies of the page are superseded.
            self.inputs[i].hdr = None;

            if page_written || pgno > commit {
                continue; // superseded, or past the final database size
            }
            page_written = true;

            self.enc.encode_page(hdr, &self.inputs[i].data)?;
        }

        Ok(())
    }
}
