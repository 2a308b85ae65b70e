//! Read and write already compressed tiles.
//! Does not include the process of compression and decompression.

use std::fmt;
use crate::io::*;
use crate::math::Vec2;
use crate::error::{UnitResult, Result, Error, usize_to_i32, i32_to_usize};


/// Indicates the position and resolution level of a tile.
/// The derived ordering compares tile index first and is not the order of tiles in a file.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Default)]
pub struct TileCoordinates {

    /// Index of the tile, not pixel position.
    pub tile_index: Vec2<usize>,

    /// Index of the Mip/Rip level.
    pub level_index: Vec2<usize>,
}

/// A tile of flat data, as it appears in the file.
/// The byte data is in little-endian format,
/// as these bytes will be written into the file directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {

    /// The index of the part that the tile belongs to.
    /// Only stored in the file for multi-part files.
    pub part_index: usize,

    /// The tile location.
    pub coordinates: TileCoordinates,

    /// For each line in the tile, for each channel, the row values are contiguous.
    /// This data is compressed and in little-endian format.
    pub compressed_pixels_le: Vec<u8>,
}


impl TileCoordinates {

    /// Locate the tile `(dx, dy)` in the level `(lx, ly)`.
    pub fn new(tile_index: impl Into<Vec2<usize>>, level_index: impl Into<Vec2<usize>>) -> Self {
        TileCoordinates { tile_index: tile_index.into(), level_index: level_index.into() }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        i32::write_le(usize_to_i32(self.tile_index.x(), "tile x")?, write)?;
        i32::write_le(usize_to_i32(self.tile_index.y(), "tile y")?, write)?;
        i32::write_le(usize_to_i32(self.level_index.x(), "level x")?, write)?;
        i32::write_le(usize_to_i32(self.level_index.y(), "level y")?, write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let tile_x = i32::read_le(read)?;
        let tile_y = i32::read_le(read)?;

        let level_x = i32::read_le(read)?;
        let level_y = i32::read_le(read)?;

        if level_x > 31 || level_y > 31 {
            // there can be at most 31 levels, because the largest level would have a size of 2^31,
            // which exceeds the maximum 32-bit integer value.
            return Err(Error::invalid("level index exceeding integer maximum"));
        }

        Ok(TileCoordinates {
            tile_index: Vec2(tile_x, tile_y).to_usize("tile coordinate index")?,
            level_index: Vec2(level_x, level_y).to_usize("tile coordinate level")?
        })
    }

    /// Returns if this is the original resolution or a smaller copy.
    pub fn is_largest_resolution_level(&self) -> bool {
        self.level_index == Vec2(0, 0)
    }
}

impl fmt::Display for TileCoordinates {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} at level {}", self.tile_index, self.level_index)
    }
}


/// Validation of chunks is done while reading and writing the actual pixels.
impl Chunk {

    /// Without validation, write this instance to the byte stream.
    pub fn write(&self, write: &mut impl Write, is_multipart: bool) -> UnitResult {
        if is_multipart { usize_to_i32(self.part_index, "part index")?.write_le(write)?; }
        else { debug_assert_eq!(self.part_index, 0, "invalid part index for single part file"); }

        self.coordinates.write(write)?;
        u8::write_i32_sized_slice_le(write, &self.compressed_pixels_le)?;
        Ok(())
    }

    /// Read the value without validating.
    /// Rejects tiles that claim to be larger than `max_byte_size`.
    pub fn read(read: &mut impl Read, is_multipart: bool, max_byte_size: usize) -> Result<Self> {
        let part_index = i32_to_usize(
            if is_multipart { i32::read_le(read)? } // documentation says u64, but is i32
            else { 0_i32 }, // reference the first header for single-part files
            "chunk data part number"
        )?;

        let coordinates = TileCoordinates::read(read)?;

        let compressed_pixels_le = u8::read_i32_sized_vec_le(
            read, max_byte_size, Some(max_byte_size), "tile block sample count"
        )?;

        Ok(Chunk { part_index, coordinates, compressed_pixels_le })
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn multipart_chunks_start_with_part_number(){
        let chunk = Chunk {
            part_index: 2,
            coordinates: TileCoordinates::new((3, 1), (1, 0)),
            compressed_pixels_le: vec![ 9, 8, 7 ],
        };

        let mut bytes = Vec::new();
        chunk.write(&mut bytes, true).unwrap();
        assert_eq!(bytes.len(), 4 + 4 * 4 + 4 + 3);
        assert_eq!(&bytes[.. 8], &[ 2, 0, 0, 0, 3, 0, 0, 0 ]);

        let read = Chunk::read(&mut bytes.as_slice(), true, 3).unwrap();
        assert_eq!(read, chunk);
    }

    #[test]
    fn oversized_chunks_are_rejected(){
        let chunk = Chunk {
            part_index: 0,
            coordinates: TileCoordinates::new((0, 0), (0, 0)),
            compressed_pixels_le: vec![ 1; 64 ],
        };

        let mut bytes = Vec::new();
        chunk.write(&mut bytes, false).unwrap();
        assert!(Chunk::read(&mut bytes.as_slice(), false, 63).is_err());
        assert!(Chunk::read(&mut bytes.as_slice(), false, 64).is_ok());
    }

    #[test]
    fn display(){
        let coordinates = TileCoordinates::new((3, 1), (0, 2));
        assert_eq!(coordinates.to_string(), "(3, 1) at level (0, 2)");
    }
}
