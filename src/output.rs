//! Write the tiles of a single tiled part from a frame buffer.
//!
//! Creating a file writes the meta data and an offset table full of zeroes.
//! Tiles are compressed in parallel and appended to the stream as soon as their line order allows.
//! Finishing the file writes the real offset table over the placeholder.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Seek};
use std::iter::Peekable;
use std::ops::{Range, RangeInclusive};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::io::*;
use crate::math::Vec2;
use crate::chunk::{Chunk, TileCoordinates};
use crate::geometry::LevelGeometry;
use crate::offsets::OffsetTable;
use crate::frame_buffer::FrameBuffer;
use crate::parallel::{TileWorkers, default_thread_count, first_error};
use crate::input::{TiledInputFile, RawTileAccess, tile_range};
use crate::meta::MetaData;
use crate::meta::header::Header;
use crate::meta::attribute::{LineOrder, TileDescription};
use crate::error::{Error, UnitResult, Result};


/// Specify how a file should be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {

    /// The number of threads that compress tiles.
    /// Zero or one means that all tiles are compressed on the calling thread.
    pub thread_count: usize,

    /// Reject headers that may produce errors in other exr readers.
    pub pedantic: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions { thread_count: default_thread_count(), pedantic: false }
    }
}

impl WriteOptions {

    /// Compress all tiles on the calling thread.
    pub fn non_parallel(self) -> Self { WriteOptions { thread_count: 1, ..self } }

    /// Compress tiles on the specified number of threads.
    pub fn with_thread_count(self, thread_count: usize) -> Self { WriteOptions { thread_count, ..self } }

    /// Reject headers that are not strictly valid.
    pub fn pedantic(self) -> Self { WriteOptions { pedantic: true, ..self } }
}


/// Writes the tiles of a single tiled part to a seekable byte stream.
///
/// Call `finish` after the last tile. Dropping an unfinished file also writes the offset table,
/// but any error that happens while doing so can only be logged.
#[derive(Debug)]
pub struct TiledOutputFile<W: Write + Seek> {

    /// Only locked while writing a single chunk.
    state: Mutex<WriterState<W>>,

    meta_data: MetaData,
    geometry: LevelGeometry,

    frame_buffer: FrameBuffer,
    file_name: Option<PathBuf>,
    workers: TileWorkers,
    finished: bool,
}

/// Everything that is modified when a chunk is written.
#[derive(Debug)]
struct WriterState<W> {
    stream: Tracking<W>,
    offsets: OffsetTable,
    offset_table_position: usize,
    is_multipart: bool,

    /// Compressed tiles that arrived before their predecessors, by their line order index.
    pending_chunks: BTreeMap<usize, Chunk>,

    /// Line order indices that have not been written yet, if tiles must be sorted.
    unwritten_indices: Peekable<Range<usize>>,
    requires_sorting: bool,
}


impl TiledOutputFile<BufWriter<File>> {

    /// Create a file at the path, with default options.
    pub fn create(path: impl AsRef<Path>, header: Header) -> Result<Self> {
        Self::create_with(path, header, WriteOptions::default())
    }

    /// Create a file at the path and write the header.
    /// The file is closed when this handle is dropped.
    pub fn create_with(path: impl AsRef<Path>, header: Header, options: WriteOptions) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "creating tiled file");

        let file = BufWriter::new(File::create(path)?);
        let mut output = Self::from_buffered(file, header, options)?;
        output.file_name = Some(path.to_path_buf());
        Ok(output)
    }
}


impl<W: Write + Seek + Send> TiledOutputFile<W> {

    /// Write the header and a placeholder offset table to the stream.
    /// The stream should be buffered, as many small writes are performed.
    /// The chunk count of the header is computed from its tile description and data window.
    pub fn from_buffered(write: W, mut header: Header, options: WriteOptions) -> Result<Self> {
        header.chunk_count = header.geometry().tile_count();

        let geometry = header.geometry();
        let line_order = header.line_order;
        let meta_data = MetaData::new(smallvec![ header ]);

        let mut stream = Tracking::new(write);
        meta_data.write_validating(&mut stream, options.pedantic)?;

        // zeroes, will be updated after the last chunk has been written
        let offsets = OffsetTable::new(geometry);
        let offset_table_position = stream.byte_position();
        stream.seek_write_to(offset_table_position + offsets.byte_size())?;

        tracing::debug!(
            tiles = offsets.len(), ?line_order,
            levels = %Vec2(geometry.num_x_levels(), geometry.num_y_levels()),
            "created tiled part"
        );

        let state = WriterState {
            unwritten_indices: (0 .. offsets.len()).peekable(),
            requires_sorting: line_order != LineOrder::Unspecified,
            is_multipart: meta_data.requirements.is_multipart(),
            pending_chunks: BTreeMap::new(),
            stream, offsets, offset_table_position,
        };

        Ok(TiledOutputFile {
            state: Mutex::new(state),
            workers: TileWorkers::new(options.thread_count, "exr tile compressor"),
            frame_buffer: FrameBuffer::new(),
            file_name: None,
            finished: false,
            meta_data, geometry,
        })
    }

    /// Bind the memory that tiles are written from.
    /// Every channel of the header must have a slice. Slices of other channels are ignored.
    pub fn set_frame_buffer(&mut self, frame_buffer: FrameBuffer) -> UnitResult {
        frame_buffer.validate(&self.header().channels)?;
        self.frame_buffer = frame_buffer;
        Ok(())
    }

    /// Write a single tile from the frame buffer.
    pub fn write_tile(&mut self, tile: TileCoordinates) -> UnitResult {
        self.write_tile_batch(&[ tile ])
    }

    /// Write a rectangular range of tiles of one level, including both ends of each range.
    pub fn write_tiles(
        &mut self, tile_x: RangeInclusive<usize>, tile_y: RangeInclusive<usize>,
        level: impl Into<Vec2<usize>>
    ) -> UnitResult
    {
        let tiles = tile_range(&self.geometry, tile_x, tile_y, level.into())?;
        self.write_tile_batch(&tiles)
    }

    /// Write any number of tiles, of any levels, from the frame buffer.
    /// Every tile is attempted, even if some of them fail.
    /// Returns the error of the first failed tile in the list.
    pub fn write_tile_batch(&mut self, tiles: &[TileCoordinates]) -> UnitResult {
        let this = &*self;
        this.frame_buffer.validate(&this.header().channels)?;

        tracing::debug!(tiles = tiles.len(), threads = this.workers.thread_count(), "writing tiles");
        let results = this.workers.map(tiles, |&tile| this.write_tile_from_frame_buffer(tile));

        first_error(results)
    }

    fn write_tile_from_frame_buffer(&self, tile: TileCoordinates) -> UnitResult {
        let header = self.header();
        let tile_bounds = self.geometry.data_window_for_tile(tile)?;
        debug_assert!(header.data_window.contains(tile_bounds), "tile {} outside of the data window", tile);

        let pixels = self.frame_buffer.gather_tile(&header.channels, tile_bounds)?;
        let compressed_pixels_le = header.compression.compress_tile(pixels)?;

        self.write_chunk(Chunk { part_index: 0, coordinates: tile, compressed_pixels_le })
    }

    /// Append the chunk to the stream, or stash it until its predecessors have been written.
    fn write_chunk(&self, chunk: Chunk) -> UnitResult {
        let index = self.geometry.line_order_index(chunk.coordinates, self.header().line_order)?;
        let mut state = self.state.lock().map_err(|_| Error::poisoned())?;
        state.write_or_stash_chunk(index, chunk)
    }

    /// Copy all tiles of the input file without recompressing them.
    /// The input must have the same channels, tiles, data window and compression,
    /// and no tile may have been written to this file yet.
    /// Tiles missing from the input are skipped.
    pub fn copy_tiles_from<R: Read + Seek + Send>(&mut self, input: &TiledInputFile<R>) -> UnitResult {
        let (source, target) = (input.header(), self.header());

        let layout_matches = source.channels == target.channels
            && source.tiles == target.tiles
            && source.data_window == target.data_window
            && source.compression == target.compression;

        if !layout_matches {
            return Err(Error::invalid("tiles can only be copied between parts with the same layout"));
        }

        {
            let state = self.state.lock().map_err(|_| Error::poisoned())?;
            if state.offsets.missing_tiles().len() != state.offsets.len() || !state.pending_chunks.is_empty() {
                return Err(Error::invalid("tiles can only be copied into a file without any tiles"));
            }
        }

        let tiles = input.tile_order();
        tracing::debug!(source_part = input.multi_part_index(), tiles = tiles.len(), "copying raw tiles");

        for tile in tiles {
            let compressed_pixels_le = RawTileAccess::raw_tile_data(input, tile)?;
            self.write_chunk(Chunk { part_index: 0, coordinates: tile, compressed_pixels_le })?;
        }

        Ok(())
    }
}


impl<W: Write + Seek> TiledOutputFile<W> {

    /// Write all stashed tiles, then the offset table, and flush the stream.
    /// Tiles that have not been written remain missing in the file.
    pub fn finish(mut self) -> UnitResult {
        self.finish_in_place()
    }

    fn finish_in_place(&mut self) -> UnitResult {
        if self.finished {
            return Ok(());
        }

        // do not try again while dropping
        self.finished = true;

        let state = self.state.get_mut().map_err(|_| Error::poisoned())?;
        let pending = state.pending_chunks.len();
        state.write_pending_chunks()?;
        state.write_offset_table()?;

        let missing = state.offsets.missing_tiles().len();
        tracing::debug!(pending, missing, file = ?self.file_name, "finished tiled file");
        Ok(())
    }

    /// The header of the part that is written.
    pub fn header(&self) -> &Header { &self.meta_data.headers[0] }

    /// The header and the version requirements of the file.
    pub fn meta_data(&self) -> &MetaData { &self.meta_data }

    /// The path of the file, if it was created at a path.
    pub fn file_name(&self) -> Option<&Path> { self.file_name.as_deref() }

    /// The memory that tiles are written from.
    pub fn frame_buffer(&self) -> &FrameBuffer { &self.frame_buffer }

    /// The levels and tiles of the part.
    pub fn geometry(&self) -> &LevelGeometry { &self.geometry }

    /// How the part is divided into tiles.
    pub fn tile_description(&self) -> TileDescription { self.geometry.tile_description() }

    /// Number of threads that compress tiles.
    pub fn thread_count(&self) -> usize { self.workers.thread_count() }

    /// Whether every tile of every level has been written.
    /// Visits all tiles on each call.
    pub fn is_complete(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.offsets.is_complete()
    }

    /// All tiles that have not been written yet, in the order of the offset table.
    pub fn missing_tiles(&self) -> Vec<TileCoordinates> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let pending: HashSet<TileCoordinates> = state.pending_chunks.values()
            .map(|chunk| chunk.coordinates).collect();

        state.offsets.missing_tiles().into_iter()
            .filter(|tile| !pending.contains(tile))
            .collect()
    }

    delegate_level_geometry!();
}

impl<W: Write + Seek> Drop for TiledOutputFile<W> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(error) = self.finish_in_place() {
                tracing::warn!(%error, file = ?self.file_name, "failed to finish tiled file while dropping it");
            }
        }
    }
}


impl<W: Write + Seek> WriterState<W> {

    /// Write the chunk now if all of its predecessors have been written, and stash it otherwise.
    fn write_or_stash_chunk(&mut self, index: usize, chunk: Chunk) -> UnitResult {
        if self.offsets.contains(chunk.coordinates)? || self.pending_chunks.contains_key(&index) {
            return Err(Error::DuplicateTile(chunk.coordinates));
        }

        if !self.requires_sorting {
            return self.append_chunk(chunk);
        }

        // write this chunk now if possible
        if self.unwritten_indices.peek() == Some(&index) {
            self.append_chunk(chunk)?;
            self.unwritten_indices.next();

            // write all pending chunks that are immediate successors of this chunk
            while let Some(next_chunk) = self.unwritten_indices.peek().cloned()
                .and_then(|next_index| self.pending_chunks.remove(&next_index))
            {
                self.append_chunk(next_chunk)?;
                self.unwritten_indices.next();
            }
        }

        else {
            self.pending_chunks.insert(index, chunk);
        }

        Ok(())
    }

    fn append_chunk(&mut self, chunk: Chunk) -> UnitResult {
        let position = self.stream.byte_position();
        chunk.write(&mut self.stream, self.is_multipart)?;
        self.offsets.insert(chunk.coordinates, position)
    }

    /// Write all stashed chunks in line order, regardless of missing predecessors.
    fn write_pending_chunks(&mut self) -> UnitResult {
        let pending = std::mem::take(&mut self.pending_chunks);

        for (_, chunk) in pending {
            self.append_chunk(chunk)?;
        }

        Ok(())
    }

    /// Seek back to the placeholder, write the offset table, and flush the stream.
    /// Leaves the stream positioned in the middle of the file.
    fn write_offset_table(&mut self) -> UnitResult {
        self.stream.seek_write_to(self.offset_table_position)?;
        self.offsets.write(&mut self.stream)?;

        // make sure we catch all (possibly delayed) io errors before returning
        self.stream.flush()?;
        Ok(())
    }
}
