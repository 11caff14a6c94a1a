//! Request body decompression for OTLP/HTTP.

use std::io::Read;

use thiserror::Error;

use crate::core::config::CompressionAlgorithm;

/// Decompression failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecompressError {
    /// The body is not valid for its `Content-Encoding`
    #[error("corrupt {encoding} body: {reason}")]
    Corrupt {
        /// Encoding name
        encoding: &'static str,
        /// Decoder message
        reason: String,
    },

    /// The decompressed body exceeds the configured limit
    #[error("decompressed body exceeds {limit} bytes")]
    TooLarge {
        /// Limit in bytes
        limit: usize,
    },
}

/// Decompress `body` encoded with `alg`, reading at most `limit` bytes of output.
pub fn decompress(
    alg: CompressionAlgorithm,
    body: &[u8],
    limit: usize,
) -> Result<Vec<u8>, DecompressError> {
    let corrupt = |reason: String| DecompressError::Corrupt {
        encoding: alg.as_str(),
        reason,
    };

    match alg {
        CompressionAlgorithm::Identity => {
            if body.len() > limit {
                return Err(DecompressError::TooLarge { limit });
            }
            Ok(body.to_vec())
        },
        CompressionAlgorithm::Gzip => read_limited(flate2::read::GzDecoder::new(body), alg, limit),
        // Senders use "deflate" for zlib-wrapped streams.
        CompressionAlgorithm::Zlib | CompressionAlgorithm::Deflate => {
            read_limited(flate2::read::ZlibDecoder::new(body), alg, limit)
        },
        CompressionAlgorithm::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(body).map_err(|e| corrupt(e.to_string()))?;
            read_limited(decoder, alg, limit)
        },
        CompressionAlgorithm::Snappy => {
            let len = snap::raw::decompress_len(body).map_err(|e| corrupt(e.to_string()))?;
            if len > limit {
                return Err(DecompressError::TooLarge { limit });
            }
            snap::raw::Decoder::new()
                .decompress_vec(body)
                .map_err(|e| corrupt(e.to_string()))
        },
        CompressionAlgorithm::Lz4 => {
            read_limited(lz4_flex::frame::FrameDecoder::new(body), alg, limit)
        },
    }
}

fn read_limited<R: Read>(
    reader: R,
    alg: CompressionAlgorithm,
    limit: usize,
) -> Result<Vec<u8>, DecompressError> {
    let mut out = Vec::new();
    let max = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader
        .take(max)
        .read_to_end(&mut out)
        .map_err(|e| DecompressError::Corrupt {
            encoding: alg.as_str(),
            reason: e.to_string(),
        })?;

    if out.len() > limit {
        return Err(DecompressError::TooLarge { limit });
    }
    Ok(out)
}
