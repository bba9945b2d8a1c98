//! The external compression-codec boundary.
//!
//! Per the design notes, decompression is not transparent at the block-data
//! API: a [`crate::block_handle::BlockHandle`] always exposes the raw
//! (possibly compressed) bytes, and the compression codec name off the
//! block header. Callers that need a compressed block's payload supply a
//! [`Decompressor`] of their own choosing (backed by `flate2`, `bzip2`,
//! `lz4_flex`, or any other codec crate) rather than this crate picking one
//! for them.

use crate::error::AsdfError;

/// A pluggable decompressor, matching the reference implementation's
/// `decompress(name, src, src_size, dst_size) -> bytes` interface.
pub trait Decompressor {
    /// Decompress `src` (the block's raw `used_size` bytes) into a buffer
    /// of exactly `expected_uncompressed` bytes (the block's `data_size`),
    /// using the codec named `name` (as found in the block header's
    /// `compression` field, e.g. `"zlib"`, `"bzp2"`, `"lz4"`).
    fn decompress(&self, name: &str, src: &[u8], expected_uncompressed: usize) -> Result<Vec<u8>, AsdfError>;
}

/// A registry-style dispatcher over several named codecs, for callers who
/// want to support more than one compression name without writing their
/// own `match` on `name`.
#[derive(Default)]
pub struct CodecTable {
    codecs: Vec<(String, Box<dyn Fn(&[u8], usize) -> Result<Vec<u8>, AsdfError>>)>,
}

impl CodecTable {
    pub fn new() -> CodecTable {
        CodecTable { codecs: Vec::new() }
    }

    /// Register a codec under `name` (matched against the block header's
    /// zero-padded ASCII `compression` field, e.g. `"zlib"`).
    pub fn register(
        &mut self,
        name: impl Into<String>,
        codec: impl Fn(&[u8], usize) -> Result<Vec<u8>, AsdfError> + 'static,
    ) {
        self.codecs.push((name.into(), Box::new(codec)));
    }
}

impl Decompressor for CodecTable {
    fn decompress(&self, name: &str, src: &[u8], expected_uncompressed: usize) -> Result<Vec<u8>, AsdfError> {
        self.codecs
            .iter()
            .find(|(codec_name, _)| codec_name == name)
            .map(|(_, codec)| codec(src, expected_uncompressed))
            .unwrap_or_else(|| Err(AsdfError::UnsupportedCompression(name.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_to_registered_codec() {
        let mut table = CodecTable::new();
        table.register("identity", |src, expected| {
            if src.len() != expected {
                return Err(AsdfError::Other("length mismatch".to_string()));
            }
            Ok(src.to_vec())
        });
        let out = table.decompress("identity", &[1, 2, 3], 3).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn unregistered_codec_is_reported() {
        let table = CodecTable::new();
        assert!(matches!(
            table.decompress("lz4", &[], 0),
            Err(AsdfError::UnsupportedCompression(ref n)) if n == "lz4"
        ));
    }
}
