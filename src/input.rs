//! Read the tiles of one part of a tiled exr file into a frame buffer.
//!
//! Opening a file reads the meta data and the offset table of the part.
//! Each batch of tiles is then located with the offset table, read from the stream one chunk at a time,
//! and decompressed in parallel, directly into the memory described by the frame buffer.

use std::fs::File;
use std::io::{BufReader, Seek};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::collections::HashSet;

use crate::io::*;
use crate::math::Vec2;
use crate::chunk::{Chunk, TileCoordinates};
use crate::geometry::LevelGeometry;
use crate::offsets::OffsetTable;
use crate::frame_buffer::FrameBuffer;
use crate::parallel::{TileWorkers, default_thread_count, first_error};
use crate::meta::MetaData;
use crate::meta::header::Header;
use crate::meta::attribute::TileDescription;
use crate::error::{Error, Result, UnitResult};


/// Specify how a file should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {

    /// The number of threads that decompress tiles.
    /// Zero or one means that all tiles are decompressed on the calling thread.
    pub thread_count: usize,

    /// Reject files that may produce errors in other exr readers,
    /// instead of reading as much as possible.
    pub pedantic: bool,

    /// Reject files whose pixels would occupy more bytes than this when decompressed.
    pub max_pixel_bytes: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions { thread_count: default_thread_count(), pedantic: false, max_pixel_bytes: None }
    }
}

impl ReadOptions {

    /// Decompress all tiles on the calling thread.
    pub fn non_parallel(self) -> Self { ReadOptions { thread_count: 1, ..self } }

    /// Decompress tiles on the specified number of threads.
    pub fn with_thread_count(self, thread_count: usize) -> Self { ReadOptions { thread_count, ..self } }

    /// Reject files that are not strictly valid.
    pub fn pedantic(self) -> Self { ReadOptions { pedantic: true, ..self } }

    /// Reject files that would occupy more memory than this.
    pub fn with_max_pixel_bytes(self, max_pixel_bytes: usize) -> Self {
        ReadOptions { max_pixel_bytes: Some(max_pixel_bytes), ..self }
    }
}


/// Reads tiles of a single part from a seekable byte stream.
///
/// The stream type expresses ownership: a `TiledInputFile<BufReader<File>>` owns and closes its file,
/// while a `TiledInputFile<&mut Cursor<Vec<u8>>>` only borrows a stream that remains usable afterwards.
#[derive(Debug)]
pub struct TiledInputFile<R> {

    /// Only locked while reading a single chunk.
    stream: Mutex<Tracking<R>>,

    meta_data: MetaData,
    part_index: usize,

    geometry: LevelGeometry,
    offsets: OffsetTable,

    /// The largest chunk of any part, used to reject broken chunk sizes.
    max_chunk_byte_size: usize,

    frame_buffer: FrameBuffer,
    file_name: Option<PathBuf>,
    pedantic: bool,
    workers: TileWorkers,
}


/// The raw access to tiles that an output file needs to copy tiles without recompressing them.
pub(crate) trait RawTileAccess {

    /// The compressed bytes of the tile, exactly as stored in the file.
    fn raw_tile_data(&self, tile: TileCoordinates) -> Result<Vec<u8>>;

    /// The index of the part that is accessed.
    fn multi_part_index(&self) -> usize;

    /// All tiles that exist in the file, in the order of their chunks in the byte stream.
    fn tile_order(&self) -> Vec<TileCoordinates>;
}


impl TiledInputFile<BufReader<File>> {

    /// Open the first part of the file at the path, with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReadOptions::default())
    }

    /// Open the first part of the file at the path.
    /// The file is closed when this handle is dropped.
    pub fn open_with(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening tiled file");

        let file = BufReader::new(File::open(path)?);
        let mut input = Self::from_buffered(file, options)?;
        input.file_name = Some(path.to_path_buf());
        Ok(input)
    }
}


impl<R: Read + Seek + Send> TiledInputFile<R> {

    /// Read the first part of the stream.
    /// The stream should be buffered, as many small reads are performed.
    pub fn from_buffered(read: R, options: ReadOptions) -> Result<Self> {
        Self::from_buffered_part(read, 0, options)
    }

    /// Read the part with the specified index of the stream.
    /// The stream should be buffered, as many small reads are performed.
    pub fn from_buffered_part(read: R, part_index: usize, options: ReadOptions) -> Result<Self> {
        let mut read = PeekRead::new(Tracking::new(read));
        let meta_data = MetaData::read_validated(&mut read, options.max_pixel_bytes, options.pedantic)?;

        let header = meta_data.headers.get(part_index)
            .ok_or_else(|| Error::invalid(format!("file has no part with index {}", part_index)))?;

        let geometry = header.geometry();

        // the offset tables of all parts are stored before the first chunk
        let table_bytes = |headers: &[Header]| -> usize {
            headers.iter().map(|header| header.chunk_count * u64::BYTE_SIZE).sum()
        };

        skip_bytes(&mut read, table_bytes(&meta_data.headers[.. part_index]))?;
        let mut offsets = OffsetTable::read(&mut read, geometry)?;
        let chunks_start = read.byte_position() + table_bytes(&meta_data.headers[part_index + 1 ..]);

        let max_chunk_byte_size = meta_data.headers.iter()
            .map(Header::max_tile_byte_size)
            .try_fold(0, |max, size| size.map(|size| max.max(size)))?;

        let mut stream = read.into_inner()?;
        let stream_length = stream.stream_length()?;

        if offsets.is_broken(chunks_start, stream_length) {
            tracing::warn!(
                part_index, chunks_start, stream_length,
                "offset table is incomplete, scanning chunks to locate tiles"
            );

            let found = offsets.reconstruct(
                &mut stream, chunks_start, part_index,
                meta_data.requirements.is_multipart(), max_chunk_byte_size
            )?;

            tracing::debug!(found, expected = offsets.len(), "reconstructed offset table");
        }

        tracing::debug!(
            part_index, tiles = offsets.len(), levels = %Vec2(geometry.num_x_levels(), geometry.num_y_levels()),
            "opened tiled part"
        );

        Ok(TiledInputFile {
            stream: Mutex::new(stream),
            workers: TileWorkers::new(options.thread_count, "exr tile decompressor"),
            frame_buffer: FrameBuffer::new(),
            file_name: None,
            pedantic: options.pedantic,
            meta_data, part_index, geometry, offsets, max_chunk_byte_size,
        })
    }

    /// Bind the memory that tiles are read into.
    /// Every channel of the file must have a slice. Slices of other channels are filled with their fill value.
    pub fn set_frame_buffer(&mut self, frame_buffer: FrameBuffer) -> UnitResult {
        frame_buffer.validate(&self.header().channels)?;
        self.frame_buffer = frame_buffer;
        Ok(())
    }

    /// Read a single tile into the frame buffer.
    pub fn read_tile(&mut self, tile: TileCoordinates) -> UnitResult {
        self.read_tile_batch(&[ tile ])
    }

    /// Read the tile `(dx, dy)` of the mip map level `(level, level)`.
    pub fn read_mip_tile(&mut self, dx: usize, dy: usize, level: usize) -> UnitResult {
        self.read_tile(TileCoordinates::new((dx, dy), (level, level)))
    }

    /// Read a rectangular range of tiles of one level, including both ends of each range.
    pub fn read_tiles(
        &mut self, tile_x: RangeInclusive<usize>, tile_y: RangeInclusive<usize>,
        level: impl Into<Vec2<usize>>
    ) -> UnitResult
    {
        let tiles = tile_range(&self.geometry, tile_x, tile_y, level.into())?;
        self.read_tile_batch(&tiles)
    }

    /// Read any number of tiles, of any levels, into the frame buffer.
    /// Every tile is attempted, even if some of them fail.
    /// Returns the error of the first failed tile in the list.
    /// Tiles that were read successfully remain in the frame buffer.
    /// A tile that appears several times in the list is read only once.
    pub fn read_tile_batch(&mut self, tiles: &[TileCoordinates]) -> UnitResult {
        let this = &*self;
        this.frame_buffer.validate(&this.header().channels)?;

        // no two workers may write the same pixels
        let mut requested = HashSet::with_capacity(tiles.len());
        let tiles: Vec<TileCoordinates> = tiles.iter().copied()
            .filter(|&tile| requested.insert(tile))
            .collect();

        tracing::debug!(tiles = tiles.len(), threads = this.workers.thread_count(), "reading tiles");
        let results = this.workers.map(&tiles, |&tile| this.read_tile_into_frame_buffer(tile));

        first_error(results)
    }

    fn read_tile_into_frame_buffer(&self, tile: TileCoordinates) -> UnitResult {
        let tile_bounds = self.geometry.data_window_for_tile(tile)?;
        let chunk = self.read_chunk(tile)?;
        let header = self.header();
        debug_assert!(header.data_window.contains(tile_bounds), "tile {} outside of the data window", tile);

        let expected_byte_size = tile_bounds.size.area() * header.channels.bytes_per_pixel;
        let pixels = header.compression.decompress_tile(chunk.compressed_pixels_le, expected_byte_size, self.pedantic)?;

        self.frame_buffer.scatter_tile(&header.channels, tile_bounds, &pixels)
    }

    /// Read the chunk of the tile from the stream.
    fn read_chunk(&self, tile: TileCoordinates) -> Result<Chunk> {
        let offset = self.offsets.offset(tile)?.ok_or_else(|| Error::missing_tile(tile))?;

        let chunk = {
            let mut stream = self.stream.lock().map_err(|_| Error::poisoned())?;
            stream.seek_read_to(offset)?;
            Chunk::read(&mut *stream, self.meta_data.requirements.is_multipart(), self.max_chunk_byte_size)?
        };

        if chunk.part_index != self.part_index || chunk.coordinates != tile {
            return Err(Error::invalid(format!(
                "offset of tile {} points to tile {} of part {}",
                tile, chunk.coordinates, chunk.part_index
            )));
        }

        Ok(chunk)
    }

    /// The compressed bytes of the tile, exactly as stored in the file.
    pub fn raw_tile_data(&self, tile: TileCoordinates) -> Result<Vec<u8>> {
        Ok(self.read_chunk(tile)?.compressed_pixels_le)
    }
}


impl<R> TiledInputFile<R> {

    /// The header of the part that is read.
    pub fn header(&self) -> &Header { &self.meta_data.headers[self.part_index] }

    /// The headers of all parts of the file, and the version requirements.
    pub fn meta_data(&self) -> &MetaData { &self.meta_data }

    /// The index of the part that is read.
    pub fn part_index(&self) -> usize { self.part_index }

    /// The file format version in the lowest byte, followed by the feature flags of the file.
    pub fn version(&self) -> u32 { self.meta_data.requirements.version_and_flags() }

    /// The path of the file, if it was opened from a path.
    pub fn file_name(&self) -> Option<&Path> { self.file_name.as_deref() }

    /// The memory that tiles are read into.
    pub fn frame_buffer(&self) -> &FrameBuffer { &self.frame_buffer }

    /// The levels and tiles of the part.
    pub fn geometry(&self) -> &LevelGeometry { &self.geometry }

    /// How the part is divided into tiles.
    pub fn tile_description(&self) -> TileDescription { self.geometry.tile_description() }

    /// Number of threads that decompress tiles.
    pub fn thread_count(&self) -> usize { self.workers.thread_count() }

    /// Whether every tile of every level is present in the file.
    /// Visits all tiles on each call.
    pub fn is_complete(&self) -> bool { self.offsets.is_complete() }

    /// All tiles that are not present in the file, in the order of the offset table.
    pub fn missing_tiles(&self) -> Vec<TileCoordinates> { self.offsets.missing_tiles() }

    delegate_level_geometry!();
}


impl<R: Read + Seek + Send> RawTileAccess for TiledInputFile<R> {
    fn raw_tile_data(&self, tile: TileCoordinates) -> Result<Vec<u8>> {
        TiledInputFile::raw_tile_data(self, tile)
    }

    fn multi_part_index(&self) -> usize {
        self.part_index
    }

    fn tile_order(&self) -> Vec<TileCoordinates> {
        let mut located: Vec<(usize, TileCoordinates)> = self.geometry.ordered_tiles()
            .filter_map(|tile| match self.offsets.offset(tile) {
                Ok(Some(offset)) => Some((offset, tile)),
                _ => None,
            })
            .collect();

        located.sort_unstable_by_key(|&(offset, _)| offset);
        located.into_iter().map(|(_, tile)| tile).collect()
    }
}


/// All tiles in the rectangle of tile indices, row by row.
/// The ends of each range may be specified in any order.
pub(crate) fn tile_range(
    geometry: &LevelGeometry, tile_x: RangeInclusive<usize>, tile_y: RangeInclusive<usize>, level: Vec2<usize>
) -> Result<Vec<TileCoordinates>>
{
    let Vec2(columns, rows) = geometry.tile_counts(level)?;
    let (x_start, x_end) = ordered(tile_x);
    let (y_start, y_end) = ordered(tile_y);

    // report the first tile outside the level, row by row
    let outside = if y_start >= rows { Some((x_start, y_start)) }
        else if x_end >= columns { Some((x_start.max(columns), y_start)) }
        else if y_end >= rows { Some((x_start, rows)) }
        else { None };

    if let Some(tile_index) = outside {
        return Err(Error::TileCoordinateOutOfRange(TileCoordinates::new(tile_index, level)));
    }

    Ok((y_start ..= y_end)
        .flat_map(|y| (x_start ..= x_end).map(move |x| TileCoordinates::new((x, y), level)))
        .collect())
}

fn ordered(range: RangeInclusive<usize>) -> (usize, usize) {
    let (start, end) = range.into_inner();
    (start.min(end), start.max(end))
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use crate::math::RoundingMode;
    use crate::meta::attribute::*;
    use crate::meta::magic_number;
    use crate::frame_buffer::Slice;

    fn part(name: &str, size: (usize, usize), channel: &str) -> Header {
        Header::new(
            ChannelList::new(smallvec![ ChannelDescription::new(channel, SampleType::U32, false) ]),
            IntegerBounds::from_dimensions(size),
            TileDescription { tile_size: Vec2(2, 2), level_mode: LevelMode::Singular, rounding_mode: RoundingMode::Down }
        ).with_name(name)
    }

    /// Two parts, where every pixel value is `part * 1000 + y * 10 + x`.
    /// Also returns the position of the first offset table.
    fn multi_part_file() -> (Vec<u8>, usize) {
        let headers = smallvec![ part("first", (4, 2), "A"), part("second", (2, 4), "B") ];
        let meta_data = MetaData::new(headers);
        assert!(meta_data.requirements.is_multipart());

        let mut bytes = Vec::new();
        meta_data.write_validating(&mut bytes, true).unwrap();

        let tables_start = bytes.len();
        let table_count: usize = meta_data.headers.iter().map(|header| header.chunk_count).sum();
        bytes.resize(tables_start + table_count * 8, 0);

        let mut table_index = 0;
        for (part_index, header) in meta_data.headers.iter().enumerate() {
            for tile in header.geometry().ordered_tiles() {
                let offset = bytes.len() as u64;
                let table_entry = tables_start + table_index * 8;
                bytes[table_entry .. table_entry + 8].copy_from_slice(&offset.to_le_bytes());
                table_index += 1;

                let bounds = header.geometry().data_window_for_tile(tile).unwrap();
                let mut pixels = Vec::new();

                for y in bounds.position.y() .. bounds.end().y() {
                    for x in bounds.position.x() .. bounds.end().x() {
                        let value = part_index as u32 * 1000 + y as u32 * 10 + x as u32;
                        pixels.extend_from_slice(&value.to_le_bytes());
                    }
                }

                Chunk { part_index, coordinates: tile, compressed_pixels_le: pixels }
                    .write(&mut bytes, true).unwrap();
            }
        }

        (bytes, tables_start)
    }

    #[test]
    fn locate_tile_table_of_second_part(){
        let (bytes, _) = multi_part_file();
        let mut input = TiledInputFile::from_buffered_part(Cursor::new(bytes), 1, ReadOptions::default()).unwrap();

        assert_eq!(input.part_index(), 1);
        assert_eq!(input.header().name, Some(Text::from("second")));
        assert!(input.is_complete());
        assert_eq!(input.num_y_tiles(0).unwrap(), 2);

        let window = input.header().data_window;
        let mut pixels = vec![ 0_u32; window.size.area() ];

        input.set_frame_buffer(FrameBuffer::new().with_slice("B", unsafe {
            Slice::packed(SampleType::U32, pixels.as_mut_ptr() as *mut u8, window, 0.0)
        })).unwrap();

        input.read_tiles(0 ..= 0, 1 ..= 0, (0, 0)).unwrap();
        assert_eq!(pixels, vec![ 1000, 1001, 1010, 1011, 1020, 1021, 1030, 1031 ]);
    }

    #[test]
    fn unknown_part_index(){
        let (bytes, _) = multi_part_file();
        let result = TiledInputFile::from_buffered_part(Cursor::new(bytes), 2, ReadOptions::default());
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn chunks_of_other_parts_are_rejected(){
        let (mut bytes, tables_start) = multi_part_file();

        // let the first tile of the first part point to the first tile of the second part,
        // which is the third entry of the concatenated tables
        let second_part_entry = bytes[tables_start + 2 * 8 .. tables_start + 3 * 8].to_vec();
        bytes[tables_start .. tables_start + 8].copy_from_slice(&second_part_entry);

        let input = TiledInputFile::from_buffered_part(Cursor::new(bytes), 0, ReadOptions::default()).unwrap();
        assert!(matches!(input.raw_tile_data(TileCoordinates::new((0, 0), (0, 0))), Err(Error::Invalid(_))));
    }

    #[test]
    fn scan_line_file_is_not_tiled(){
        let mut bytes = Vec::new();
        magic_number::write(&mut bytes).unwrap();
        bytes.extend_from_slice(&[ 2, 0, 0, 0 ]);
        bytes.extend_from_slice(&[ 0; 64 ]);

        let result = TiledInputFile::from_buffered(Cursor::new(bytes), ReadOptions::default());
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[test]
    fn tile_ranges(){
        let geometry = part("first", (4, 2), "A").geometry();

        let tiles = tile_range(&geometry, 1 ..= 0, 0 ..= 0, Vec2(0, 0)).unwrap();
        assert_eq!(tiles, vec![ TileCoordinates::new((0, 0), (0, 0)), TileCoordinates::new((1, 0), (0, 0)) ]);

        assert!(matches!(tile_range(&geometry, 0 ..= 2, 0 ..= 0, Vec2(0, 0)), Err(Error::TileCoordinateOutOfRange(_))));
        assert!(matches!(tile_range(&geometry, 0 ..= 0, 0 ..= 0, Vec2(1, 1)), Err(Error::LevelOutOfRange(_))));
    }

    #[test]
    fn tile_ranges_far_outside_are_rejected_without_listing_them(){
        let geometry = part("first", (4, 2), "A").geometry();
        let outside = |x_range, y_range| match tile_range(&geometry, x_range, y_range, Vec2(0, 0)) {
            Err(Error::TileCoordinateOutOfRange(tile)) => tile.tile_index,
            other => panic!("expected an out of range tile, got {:?}", other),
        };

        assert_eq!(outside(0 ..= 1, 0 ..= 300_000_000), Vec2(0, 1));
        assert_eq!(outside(0 ..= usize::MAX, 0 ..= 0), Vec2(2, 0));
        assert_eq!(outside(usize::MAX ..= 5, usize::MAX ..= 7), Vec2(5, 7));
    }
}
