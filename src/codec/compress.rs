//! Built-in compression codecs

use crate::error::CodecError;

type CodecResult<T> = std::result::Result<T, CodecError>;

pub(super) fn identity(bytes: &[u8]) -> CodecResult<Vec<u8>> {
    Ok(bytes.to_vec())
}

#[cfg(feature = "lz4")]
pub(super) fn compress_lz4(bytes: &[u8]) -> CodecResult<Vec<u8>> {
    Ok(lz4_flex::compress_prepend_size(bytes))
}

#[cfg(feature = "lz4")]
pub(super) fn decompress_lz4(bytes: &[u8]) -> CodecResult<Vec<u8>> {
    Ok(lz4_flex::decompress_size_prepended(bytes)?)
}

#[cfg(feature = "zlib")]
pub(super) fn compress_zlib(bytes: &[u8]) -> CodecResult<Vec<u8>> {
    use std::io::Write;

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

#[cfg(feature = "zlib")]
pub(super) fn decompress_zlib(bytes: &[u8]) -> CodecResult<Vec<u8>> {
    use std::io::Read;

    let mut out = Vec::new();
    flate2::read::ZlibDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// zstd level used for table values
#[cfg(feature = "zstd")]
const ZSTD_LEVEL: i32 = 3;

#[cfg(feature = "zstd")]
pub(super) fn compress_zstd(bytes: &[u8]) -> CodecResult<Vec<u8>> {
    Ok(zstd::stream::encode_all(bytes, ZSTD_LEVEL)?)
}

#[cfg(feature = "zstd")]
pub(super) fn decompress_zstd(bytes: &[u8]) -> CodecResult<Vec<u8>> {
    Ok(zstd::stream::decode_all(bytes)?)
}
