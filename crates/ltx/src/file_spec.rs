//! Declarative in-memory model of a whole LTX file.

use std::io::{Read, Write};

use crate::{Decoder, Encoder, Header, PageHeader, Result, Trailer};

/// A single page frame: header plus page data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageSpec {
    pub header: PageHeader,
    pub data: Vec<u8>,
}

/// An in-memory representation of an LTX file.
///
/// `FileSpec` mirrors the file bijectively: [`FileSpec::write_to`] drives
/// an [`Encoder`] from the value, and [`FileSpec::read_from`] rebuilds the
/// value through a [`Decoder`]. Primarily a substrate for tests, where a
/// whole file can be stated as a literal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileSpec {
    pub header: Header,
    pub pages: Vec<PageSpec>,
    pub trailer: Trailer,
}

impl FileSpec {
    /// Encodes the spec to `w`. On success the spec's trailer is replaced
    /// with the encoder's resolved trailer, which carries the computed
    /// file checksum. Returns the number of bytes written.
    pub fn write_to<W: Write>(&mut self, w: W) -> Result<u64> {
        let mut enc = Encoder::new(w);
        enc.encode_header(self.header)?;

        for page in &self.pages {
            enc.encode_page(page.header, &page.data)?;
        }

        enc.set_post_apply_checksum(self.trailer.post_apply_checksum);
        enc.close()?;

        self.trailer = enc.trailer();
        Ok(enc.n())
    }

    /// Decodes a complete file from `r` into the spec, verifying it along
    /// the way. Returns the number of bytes read.
    pub fn read_from<R: Read>(&mut self, r: R) -> Result<u64> {
        let mut dec = Decoder::new(r);
        dec.decode_header()?;
        self.header = dec.header();

        let mut data = vec![0u8; self.header.page_size as usize];
        while let Some(header) = dec.decode_page(&mut data)? {
            self.pages.push(PageSpec {
                header,
                data: data.clone(),
            });
        }

        dec.close()?;
        self.trailer = dec.trailer();
        Ok(dec.n())
    }
}
