use std::io::{self, BufRead, Read};
use std::str::FromStr;

use crate::error::{Result, ScanError};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const XZ_MAGIC: &[u8] = &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];

const BROTLI_BUFFER: usize = 4096;

/// Decoder applied to the raw input before chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputCodec {
    #[default]
    Plain,
    Gzip,
    Zstd,
    Xz,
    Brotli,
    /// Sniff gzip, zstd and xz from the leading magic bytes, else plain.
    /// Brotli has no magic and must be requested explicitly.
    Auto,
}

impl FromStr for InputCodec {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "none" => Ok(InputCodec::Plain),
            "gzip" | "gz" => Ok(InputCodec::Gzip),
            "zstd" | "zst" => Ok(InputCodec::Zstd),
            "xz" | "lzma" => Ok(InputCodec::Xz),
            "brotli" | "br" => Ok(InputCodec::Brotli),
            "auto" => Ok(InputCodec::Auto),
            other => Err(ScanError::config(format!("unknown input codec '{}'", other))),
        }
    }
}

impl InputCodec {
    /// Guesses the codec from the first bytes of a stream.
    pub fn sniff(head: &[u8]) -> InputCodec {
        if head.starts_with(GZIP_MAGIC) {
            InputCodec::Gzip
        } else if head.starts_with(ZSTD_MAGIC) {
            InputCodec::Zstd
        } else if head.starts_with(XZ_MAGIC) {
            InputCodec::Xz
        } else {
            InputCodec::Plain
        }
    }

    /// Wraps `input` in the matching decoder.
    pub fn wrap<'a, R: BufRead + 'a>(self, mut input: R) -> io::Result<Box<dyn Read + 'a>> {
        let codec = match self {
            InputCodec::Auto => {
                let detected = InputCodec::sniff(input.fill_buf()?);
                log::debug!("Input codec auto-detected as {:?}", detected);
                detected
            }
            other => other,
        };

        Ok(match codec {
            InputCodec::Plain | InputCodec::Auto => Box::new(input),
            InputCodec::Gzip => Box::new(flate2::bufread::MultiGzDecoder::new(input)),
            InputCodec::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(input)?),
            InputCodec::Xz => Box::new(xz2::bufread::XzDecoder::new_multi_decoder(input)),
            InputCodec::Brotli => Box::new(brotli::Decompressor::new(input, BROTLI_BUFFER)),
        })
    }
}
