//! Header block compression
//!
//! The connection only ever sees opaque header blocks. Turning header
//! lists into blocks and back goes through [`HeaderCodec`], which the
//! connection owns and passes wherever a block is produced.

use super::error::{Error, Result};
use bytes::Bytes;
use hpack::{Decoder, Encoder};

/// Compression context shared by all streams of one connection
pub trait HeaderCodec: Send {
    /// Encode a header list into one header block
    fn encode(&mut self, headers: &[(String, String)]) -> Result<Bytes>;

    /// Decode a complete header block
    fn decode(&mut self, block: &[u8]) -> Result<Vec<(String, String)>>;
}

/// HPACK codec backed by the `hpack` crate
pub struct HpackCodec {
    encoder: Encoder<'static>,
    decoder: Decoder<'static>,
}

impl HpackCodec {
    pub fn new() -> Self {
        HpackCodec {
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        }
    }
}

impl Default for HpackCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderCodec for HpackCodec {
    fn encode(&mut self, headers: &[(String, String)]) -> Result<Bytes> {
        let header_tuples: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|(name, value)| (name.as_bytes(), value.as_bytes()))
            .collect();

        let mut block = Vec::new();
        self.encoder
            .encode_into(header_tuples, &mut block)
            .map_err(|e| Error::Internal(format!("HPACK encode error: {}", e)))?;
        Ok(Bytes::from(block))
    }

    fn decode(&mut self, block: &[u8]) -> Result<Vec<(String, String)>> {
        let decoded = self
            .decoder
            .decode(block)
            .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;

        Ok(decoded
            .into_iter()
            .map(|(name, value)| {
                (
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }
}
