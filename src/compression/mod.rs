
//! Contains the compression attribute definition
//! and methods to compress and decompress tiles.


// private modules make non-breaking changes easier
mod zip;
mod rle;


use crate::io::*;
use crate::error::{Result, Error, UnitResult};


/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];

/// Specifies which compression method to use.
/// Use uncompressed data for fastest loading and writing speeds.
/// Use RLE compression for fast loading and writing with slight memory savings.
/// Use ZIP compression for slow processing with large memory savings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {

    /// Store uncompressed values.
    /// Produces large files that can be read and written very quickly.
    /// Consider using RLE instead, as it provides some compression with almost equivalent speed.
    Uncompressed,

    /// Produces slightly smaller files
    /// that can still be read and written rather quickly.
    /// The compressed file size is usually between 60 and 75 percent of the uncompressed size.
    /// Works best for images with large flat areas, such as masks and abstract graphics.
    /// This compression method is lossless.
    RLE,

    /// Uses ZIP compression to compress each tile. Slowly produces small images
    /// which can be read with moderate speed. This compression method is lossless.
    /// In tiled files, this is encoded exactly like `ZIP16`.
    ZIP1,

    /// Uses ZIP compression to compress each tile. Slowly produces small images
    /// which can be read with moderate speed. This compression method is lossless.
    ZIP16,

    /// __Not supported by this implementation.__
    /// Wavelet transform followed by Huffman coding.
    PIZ,

    /// __Not supported by this implementation.__
    /// Like `ZIP1`, but reduces precision of `f32` samples to 24 bits.
    PXR24,

    /// __Not supported by this implementation.__
    /// Lossy 4-by-4 pixel block compression of `f16` samples.
    B44,

    /// __Not supported by this implementation.__
    /// Like `B44`, with improved compression of uniformly colored areas.
    B44A,

    /// __Not supported by this implementation.__
    /// Lossy DCT based compression, in blocks of 32 scan lines.
    DWAA,

    /// __Not supported by this implementation.__
    /// Lossy DCT based compression, in blocks of 256 scan lines.
    DWAB,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::RLE => "rle",
            Compression::ZIP1 => "zip line",
            Compression::ZIP16 => "zip block",
            Compression::B44 => "b44",
            Compression::B44A => "b44a",
            Compression::DWAA => "dwaa",
            Compression::DWAB => "dwab",
            Compression::PIZ => "piz",
            Compression::PXR24 => "pxr24",
        })
    }
}


impl Compression {

    /// Compress the little-endian pixel bytes of one tile.
    /// If the compressed bytes would not be smaller, the raw bytes are returned,
    /// which the reader recognizes by their size.
    pub fn compress_tile(self, uncompressed_little_endian: ByteVec) -> Result<ByteVec> {
        use self::Compression::*;

        if uncompressed_little_endian.is_empty() {
            return Ok(uncompressed_little_endian);
        }

        let compressed = match self {
            Uncompressed => return Ok(uncompressed_little_endian),
            RLE => rle::compress_bytes(&uncompressed_little_endian)?,
            ZIP1 | ZIP16 => zip::compress_bytes(&uncompressed_little_endian)?,
            _ => return Err(Error::unsupported(format!("yet unimplemented compression method: {}", self))),
        };

        if compressed.len() < uncompressed_little_endian.len() {
            Ok(compressed)
        }
        else {
            // only write compressed if it actually is smaller than raw
            Ok(uncompressed_little_endian)
        }
    }

    /// Decompress the bytes of one tile into little-endian pixel bytes.
    pub fn decompress_tile(self, compressed: ByteVec, expected_byte_size: usize, pedantic: bool) -> Result<ByteVec> {

        // note: always true where self == Uncompressed
        if compressed.len() == expected_byte_size {
            // the compressed data was larger than the raw data, so the small raw data has been written
            return Ok(compressed);
        }

        use self::Compression::*;
        let bytes = match self {
            Uncompressed => return Err(Error::codec(format!(
                "uncompressed tile has {} instead of {} bytes",
                compressed.len(), expected_byte_size
            ))),

            RLE => rle::decompress_bytes(&compressed, expected_byte_size, pedantic)?,
            ZIP1 | ZIP16 => zip::decompress_bytes(&compressed, expected_byte_size)?,
            _ => return Err(Error::unsupported(format!("yet unimplemented compression method: {}", self))),
        };

        if bytes.len() != expected_byte_size {
            Err(Error::codec(format!("decompressed {} data has an invalid size", self)))
        }

        else { Ok(bytes) }
    }

    /// Whether tiles with this compression can be read and written by this implementation.
    pub fn is_supported(self) -> bool {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIP1 | ZIP16 => true,
            PIZ | PXR24 | B44 | B44A | DWAA | DWAB => false,
        }
    }

    /// Most compression methods will reconstruct the exact pixel bytes,
    /// but some might throw away unimportant data in some cases.
    pub fn may_loose_data(self) -> bool {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIP1 | ZIP16 | PIZ => false,
            PXR24 | B44 | B44A | DWAB | DWAA  => true,
        }
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize { u8::BYTE_SIZE }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::Compression::*;
        match self {
            Uncompressed => 0_u8,
            RLE => 1_u8,
            ZIP1 => 2_u8,
            ZIP16 => 3_u8,
            PIZ => 4_u8,
            PXR24 => 5_u8,
            B44 => 6_u8,
            B44A => 7_u8,
            DWAA => 8_u8,
            DWAB => 9_u8,
        }.write_le(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::Compression::*;
        Ok(match u8::read_le(read)? {
            0 => Uncompressed,
            1 => RLE,
            2 => ZIP1,
            3 => ZIP16,
            4 => PIZ,
            5 => PXR24,
            6 => B44,
            7 => B44A,
            8 => DWAA,
            9 => DWAB,
            _ => return Err(Error::unsupported("unknown compression method")),
        })
    }
}


/// A collection of functions used to prepare data for compression.
mod optimize_bytes {

    /// Integrate over all differences to the previous value in order to reconstruct sample values.
    pub fn differences_to_samples(buffer: &mut [u8]) {
        // process elements in pairs, so that the two computations
        // within a pair can run in parallel on the instruction level
        let mut previous = match buffer.first() {
            Some(&first) => first as i16,
            None => return,
        };

        let mut pairs = buffer[1..].chunks_exact_mut(2);
        for chunk in &mut pairs {
            let diff0 = chunk[0] as i16;
            let diff1 = chunk[1] as i16;
            let sample0 = (previous + diff0 - 128) as u8;
            let sample1 = (previous + diff0 + diff1 - 128 * 2) as u8;
            chunk[0] = sample0;
            chunk[1] = sample1;
            previous = sample1 as i16;
        }

        // handle the remaining element at the end not processed by the loop over pairs
        for diff in pairs.into_remainder() {
            *diff = (previous + *diff as i16 - 128) as u8;
        }
    }

    /// Derive over all values in order to produce differences to the previous value.
    pub fn samples_to_differences(buffer: &mut [u8]){
        for index in (1..buffer.len()).rev() {
            buffer[index] = (buffer[index] as i32 - buffer[index - 1] as i32 + 128) as u8;
        }
    }

    /// Interleave the bytes such that the second half of the array is each other byte.
    pub fn interleave_byte_blocks(separated: &mut [u8]) {
        let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);

        let mut interleaved = Vec::with_capacity(separated.len());
        for index in 0 .. first_half.len() {
            interleaved.push(first_half[index]);

            if let Some(&second) = second_half.get(index) {
                interleaved.push(second);
            }
        }

        separated.copy_from_slice(interleaved.as_slice())
    }

    /// Separate the bytes such that the second half contains each other byte.
    pub fn separate_bytes_fragments(source: &mut [u8]) {
        let mut separated = Vec::with_capacity(source.len());
        separated.extend(source.iter().step_by(2));
        separated.extend(source.iter().skip(1).step_by(2));
        source.copy_from_slice(separated.as_slice());
    }


}


#[cfg(test)]
pub mod test {
    use super::*;

    fn smooth_bytes() -> ByteVec {
        (0 .. 4096_u32).map(|index| (index / 64) as u8).collect()
    }

    #[test]
    fn lossless_methods_reconstruct_bytes(){
        for &compression in &[ Compression::Uncompressed, Compression::RLE, Compression::ZIP1, Compression::ZIP16 ] {
            let original = smooth_bytes();
            let compressed = compression.compress_tile(original.clone()).unwrap();

            if compression != Compression::Uncompressed {
                assert!(compressed.len() < original.len(), "{} did not compress", compression);
            }

            let decompressed = compression.decompress_tile(compressed, original.len(), true).unwrap();
            assert_eq!(decompressed, original, "{}", compression);
        }
    }

    #[test]
    fn incompressible_tiles_are_stored_raw(){
        let noise: ByteVec = (0 .. 64).map(|_| rand::random::<u8>()).collect();
        let stored = Compression::ZIP16.compress_tile(noise.clone()).unwrap();
        assert_eq!(stored, noise);

        let read = Compression::ZIP16.decompress_tile(stored, noise.len(), true).unwrap();
        assert_eq!(read, noise);
    }

    #[test]
    fn unsupported_methods(){
        for &compression in &[ Compression::PIZ, Compression::B44, Compression::DWAB ] {
            assert!(!compression.is_supported());

            match compression.compress_tile(smooth_bytes()) {
                Err(Error::NotSupported(_)) => {},
                other => panic!("expected unsupported error, got {:?}", other),
            }
        }
    }

    #[test]
    fn broken_zip_data(){
        let result = Compression::ZIP1.decompress_tile(vec![ 1, 2, 3, 4, 5 ], 100, false);
        assert!(matches!(result, Err(Error::Codec(_))));
    }

    #[test]
    fn byte_codes(){
        for code in 0 .. 10_u8 {
            let compression = Compression::read(&mut [ code ].as_ref()).unwrap();

            let mut bytes = Vec::new();
            compression.write(&mut bytes).unwrap();
            assert_eq!(bytes, vec![ code ]);
        }

        assert!(Compression::read(&mut [ 10_u8 ].as_ref()).is_err());
    }
}
