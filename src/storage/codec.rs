//! Value encoding for byte-addressed tiers.
//!
//! Off-heap and custom tiers hold JSON-encoded values. The disk tier may
//! additionally wrap the encoding in a zstd frame.

use std::io;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::CompressionConfig;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zstd frame error: {0}")]
    Zstd(#[from] io::Error),
}

/// Encoder/decoder for tier values.
#[derive(Debug, Clone)]
pub struct Codec {
    compress: bool,
    level: i32,
}

impl Codec {
    /// JSON only, no compression. Used for in-memory serialized tiers.
    pub fn plain() -> Self {
        Self {
            compress: false,
            level: 0,
        }
    }

    /// Codec for the disk tier, honoring the compression settings.
    pub fn for_disk(config: &CompressionConfig) -> Self {
        Self {
            compress: config.disk_zstd_compression,
            level: config.zstd_level,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    /// Same codec with compression forced on or off (used when reopening
    /// files written under a different setting).
    pub fn with_compression(&self, compress: bool) -> Self {
        Self {
            compress,
            level: self.level,
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let json = serde_json::to_vec(value)?;
        if self.compress {
            Ok(zstd::encode_all(json.as_slice(), self.level)?)
        } else {
            Ok(json)
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        if self.compress {
            let json = zstd::decode_all(data)?;
            Ok(serde_json::from_slice(&json)?)
        } else {
            Ok(serde_json::from_slice(data)?)
        }
    }
}

/// Counts bytes written without buffering them.
#[derive(Default)]
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Length of the JSON encoding of `value`, without allocating it.
pub fn encoded_len<T: Serialize + ?Sized>(value: &T) -> Result<usize, CodecError> {
    let mut counter = ByteCounter::default();
    serde_json::to_writer(&mut counter, value)?;
    Ok(counter.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_roundtrip() {
        let codec = Codec::for_disk(&CompressionConfig::default());
        assert!(codec.is_compressed());

        let value = "x".repeat(4096);
        let encoded = codec.encode(&value).unwrap();
        assert!(encoded.len() < value.len()); // should compress well

        let decoded: String = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_encoded_len_matches_encoding() {
        let value = vec![1u32, 20, 300];
        let plain = Codec::plain().encode(&value).unwrap();
        assert_eq!(encoded_len(&value).unwrap(), plain.len());
        assert_eq!(encoded_len("abc").unwrap(), 5);
    }

    #[test]
    fn test_plain_decode_rejects_garbage() {
        let result: Result<String, _> = Codec::plain().decode(b"\x00\x01");
        assert!(result.is_err());
    }
}
