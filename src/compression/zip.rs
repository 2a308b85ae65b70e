
// see https://github.com/openexr/openexr/blob/master/OpenEXR/IlmImf/ImfZip.cpp

use super::*;
use super::optimize_bytes::*;
use crate::error::Result;
use zune_inflate::DeflateDecoder;


pub fn decompress_bytes(data: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let mut decoder = DeflateDecoder::new(data);

    let mut decompressed = decoder.decode_zlib()
        .map_err(|error| Error::codec(format!("zlib-compressed data malformed ({:?})", error)))?;

    if decompressed.len() != expected_byte_size {
        return Err(Error::codec("zlib-compressed data has an invalid size"));
    }

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);
    Ok(decompressed)
}

pub fn compress_bytes(uncompressed: Bytes<'_>) -> Result<ByteVec> {
    // see https://github.com/AcademySoftwareFoundation/openexr/blob/3bd93f85bcb74c77255f28cdbb913fdbfbb39dfe/OpenEXR/IlmImf/ImfTiledOutputFile.cpp#L750-L842
    let mut packed = Vec::from(uncompressed);

    separate_bytes_fragments(&mut packed);
    samples_to_differences(&mut packed);

    Ok(miniz_oxide::deflate::compress_to_vec_zlib(packed.as_slice(), 4))
}
