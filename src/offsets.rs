
//! The offset table of a tiled part locates every tile in the byte stream.
//! A tile that has not been written yet has the offset zero.

use std::io::Seek;
use crate::io::*;
use crate::chunk::{Chunk, TileCoordinates};
use crate::geometry::LevelGeometry;
use crate::error::{Error, Result, UnitResult, usize_to_u64, u64_to_usize};


/// Maps each tile coordinate of a part to the byte position of its chunk.
/// Lists the tiles in the order of `LevelGeometry::ordered_tiles`.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetTable {
    geometry: LevelGeometry,
    offsets: Vec<u64>,
}


impl OffsetTable {

    /// A table where no tile has been written yet.
    pub fn new(geometry: LevelGeometry) -> Self {
        OffsetTable { offsets: vec![ 0; geometry.tile_count() ], geometry }
    }

    /// Read the table of a part from the byte stream.
    /// Does not check whether the offsets point to valid chunks.
    pub fn read(read: &mut impl Read, geometry: LevelGeometry) -> Result<Self> {
        let offsets = u64::read_vec_le(
            read, geometry.tile_count(),
            u16::MAX as usize, None,
            "offset table size"
        )?;

        Ok(OffsetTable { geometry, offsets })
    }

    /// Without validation, write the table to the byte stream.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        u64::write_slice_le(write, &self.offsets)
    }

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size(&self) -> usize {
        self.offsets.len() * u64::BYTE_SIZE
    }

    /// Number of tile slots in this table, including unwritten tiles.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// The level geometry this table was built for.
    pub fn geometry(&self) -> &LevelGeometry {
        &self.geometry
    }

    /// The byte position of the chunk of this tile, or `None` if the tile has not been written.
    pub fn offset(&self, tile: TileCoordinates) -> Result<Option<usize>> {
        let index = self.geometry.offset_table_index(tile)?;

        match self.offsets[index] {
            0 => Ok(None),
            offset => Ok(Some(u64_to_usize(offset, "tile offset")?)),
        }
    }

    /// Record where the chunk of this tile has been written.
    /// Each tile can only be written once.
    pub fn insert(&mut self, tile: TileCoordinates, byte_position: usize) -> UnitResult {
        debug_assert_ne!(byte_position, 0, "tile written at file start bug");

        let index = self.geometry.offset_table_index(tile)?;
        let slot = &mut self.offsets[index];

        if *slot != 0 {
            return Err(Error::DuplicateTile(tile));
        }

        *slot = usize_to_u64(byte_position);
        Ok(())
    }

    /// Whether the chunk of this tile has been located.
    pub fn contains(&self, tile: TileCoordinates) -> Result<bool> {
        Ok(self.offset(tile)?.is_some())
    }

    /// Whether every tile of every level has been located.
    /// Visits every tile on each call.
    pub fn is_complete(&self) -> bool {
        self.offsets.iter().all(|&offset| offset != 0)
    }

    /// All tiles which have not been located, in the order of the table.
    pub fn missing_tiles(&self) -> Vec<TileCoordinates> {
        self.geometry.ordered_tiles()
            .zip(&self.offsets)
            .filter(|&(_, &offset)| offset == 0)
            .map(|(tile, _)| tile)
            .collect()
    }

    /// Whether any offset is zero or points outside of the chunk section of the stream.
    /// This happens for files where writing did not finish.
    pub fn is_broken(&self, chunks_start: usize, stream_length: usize) -> bool {
        let chunks_start = usize_to_u64(chunks_start);
        let stream_length = usize_to_u64(stream_length);

        self.offsets.iter().any(|&offset| offset < chunks_start || offset >= stream_length)
    }

    /// Discard all offsets and locate the tiles by reading the chunks one after another,
    /// starting at `chunks_start`. Stops at the end of the stream or at the first broken chunk.
    /// In multi-part files, chunks of other parts are skipped.
    /// Returns the number of tiles found.
    pub fn reconstruct<R: Read + Seek>(
        &mut self, read: &mut Tracking<R>, chunks_start: usize,
        part_index: usize, is_multipart: bool, max_chunk_byte_size: usize
    ) -> Result<usize>
    {
        for offset in &mut self.offsets { *offset = 0; }

        read.seek_read_to(chunks_start)?;
        let mut found = 0;

        loop {
            let chunk_start = read.byte_position();

            let chunk = match Chunk::read(read, is_multipart, max_chunk_byte_size) {
                Ok(chunk) => chunk,
                Err(_) => break,
            };

            if chunk.part_index != part_index {
                continue;
            }

            if !self.geometry.is_valid_tile(chunk.coordinates) {
                tracing::debug!(tile = %chunk.coordinates, "stopping at invalid chunk");
                break;
            }

            // the first chunk of a tile wins, as the writer never writes a tile twice
            if self.insert(chunk.coordinates, chunk_start).is_ok() {
                found += 1;
            }
        }

        Ok(found)
    }
}
