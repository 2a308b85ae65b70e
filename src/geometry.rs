
// calculations inspired by
// https://github.com/AcademySoftwareFoundation/openexr/blob/master/OpenEXR/IlmImf/ImfTiledMisc.cpp

//! Computes the resolution levels of a tiled part and the tiles in each level.
//! Contains no state and performs no input or output.
//!
//! All tiles of a part are enumerated in one canonical order:
//! levels in increasing order, with `ly` as the outer and `lx` as the inner index,
//! then the rows of tiles in each level from top to bottom, each row from left to right.
//! The offset table of a file lists its tiles in exactly this order.

use crate::math::{Vec2, RoundingMode};
use crate::meta::attribute::{TileDescription, LevelMode, IntegerBounds, LineOrder};
use crate::chunk::TileCoordinates;
use crate::error::{Error, Result};


/// Level and tile queries of a file handle, answered by its `geometry` field.
macro_rules! delegate_level_geometry {
    () => {
        /// Number of levels of a singular or mip mapped part.
        /// Fails with `Error::InvalidLevelMode` for rip maps.
        pub fn num_levels(&self) -> crate::error::Result<usize> { self.geometry.num_levels() }

        /// Number of different widths of the levels.
        pub fn num_x_levels(&self) -> usize { self.geometry.num_x_levels() }

        /// Number of different heights of the levels.
        pub fn num_y_levels(&self) -> usize { self.geometry.num_y_levels() }

        /// Whether the level exists in this part.
        pub fn is_valid_level(&self, level: impl Into<crate::math::Vec2<usize>>) -> bool {
            self.geometry.is_valid_level(level)
        }

        /// Width of all levels with the horizontal level index `lx`.
        pub fn level_width(&self, lx: usize) -> crate::error::Result<usize> { self.geometry.level_width(lx) }

        /// Height of all levels with the vertical level index `ly`.
        pub fn level_height(&self, ly: usize) -> crate::error::Result<usize> { self.geometry.level_height(ly) }

        /// Number of tile columns in all levels with the horizontal level index `lx`.
        pub fn num_x_tiles(&self, lx: usize) -> crate::error::Result<usize> { self.geometry.num_x_tiles(lx) }

        /// Number of tile rows in all levels with the vertical level index `ly`.
        pub fn num_y_tiles(&self, ly: usize) -> crate::error::Result<usize> { self.geometry.num_y_tiles(ly) }

        /// The pixel rectangle of the level.
        pub fn data_window_for_level(&self, level: impl Into<crate::math::Vec2<usize>>)
            -> crate::error::Result<crate::meta::attribute::IntegerBounds>
        {
            self.geometry.data_window_for_level(level)
        }

        /// The pixel rectangle of the tile, clipped to its level.
        pub fn data_window_for_tile(&self, tile: crate::chunk::TileCoordinates)
            -> crate::error::Result<crate::meta::attribute::IntegerBounds>
        {
            self.geometry.data_window_for_tile(tile)
        }

        /// Whether the tile exists in this part.
        pub fn is_valid_tile(&self, tile: crate::chunk::TileCoordinates) -> bool {
            self.geometry.is_valid_tile(tile)
        }
    };
}


/// The resolution levels and tile grids of a tiled part,
/// derived from its tile description and data window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelGeometry {
    tiles: TileDescription,
    data_window: IntegerBounds,
    level_count: Vec2<usize>,
}


impl LevelGeometry {

    /// Compute the number of levels of this part.
    pub fn new(tiles: TileDescription, data_window: IntegerBounds) -> Self {
        let Vec2(width, height) = data_window.size;
        let round = tiles.rounding_mode;

        let level_count = match tiles.level_mode {
            LevelMode::Singular => Vec2(1, 1),

            LevelMode::MipMap => {
                let count = round.level_count(width.max(height));
                Vec2(count, count)
            },

            LevelMode::RipMap => Vec2(round.level_count(width), round.level_count(height)),
        };

        LevelGeometry { tiles, data_window, level_count }
    }

    /// How the part is divided into tiles.
    pub fn tile_description(&self) -> TileDescription { self.tiles }

    /// The pixel rectangle of the full resolution level.
    pub fn data_window(&self) -> IntegerBounds { self.data_window }

    /// Number of different widths of the levels.
    pub fn num_x_levels(&self) -> usize { self.level_count.x() }

    /// Number of different heights of the levels.
    pub fn num_y_levels(&self) -> usize { self.level_count.y() }

    /// Number of levels of a single-level or mip-mapped part.
    /// Rip maps have independent horizontal and vertical counts,
    /// which is reported as `Error::InvalidLevelMode`.
    pub fn num_levels(&self) -> Result<usize> {
        match self.tiles.level_mode {
            LevelMode::RipMap => Err(Error::InvalidLevelMode),
            _ => Ok(self.level_count.x()),
        }
    }

    /// Whether this level exists in the part.
    /// Mip map levels always have equal horizontal and vertical indices.
    pub fn is_valid_level(&self, level: impl Into<Vec2<usize>>) -> bool {
        let Vec2(x, y) = level.into();

        x < self.num_x_levels() && y < self.num_y_levels()
            && (self.tiles.level_mode != LevelMode::MipMap || x == y)
    }

    /// Pixel width of all levels with the horizontal index `lx`.
    pub fn level_width(&self, lx: usize) -> Result<usize> {
        if lx >= self.num_x_levels() {
            return Err(Error::LevelOutOfRange(Vec2(lx, 0)));
        }

        Ok(self.tiles.rounding_mode.level_size(self.data_window.size.width(), lx))
    }

    /// Pixel height of all levels with the vertical index `ly`.
    pub fn level_height(&self, ly: usize) -> Result<usize> {
        if ly >= self.num_y_levels() {
            return Err(Error::LevelOutOfRange(Vec2(0, ly)));
        }

        Ok(self.tiles.rounding_mode.level_size(self.data_window.size.height(), ly))
    }

    /// Pixel size of the specified level.
    pub fn level_size(&self, level: impl Into<Vec2<usize>>) -> Result<Vec2<usize>> {
        let level = level.into();
        if !self.is_valid_level(level) {
            return Err(Error::LevelOutOfRange(level));
        }

        Ok(self.level_size_unchecked(level))
    }

    /// The pixel rectangle of a level, positioned at the origin of the data window.
    pub fn data_window_for_level(&self, level: impl Into<Vec2<usize>>) -> Result<IntegerBounds> {
        let size = self.level_size(level)?;
        Ok(IntegerBounds::new(self.data_window.position, size))
    }

    /// The pixel rectangle of the mip map level `(level, level)`.
    pub fn data_window_for_mip_level(&self, level: usize) -> Result<IntegerBounds> {
        self.data_window_for_level(Vec2(level, level))
    }

    /// Number of tile columns in all levels with the horizontal index `lx`.
    pub fn num_x_tiles(&self, lx: usize) -> Result<usize> {
        Ok(RoundingMode::Up.divide(self.level_width(lx)?, self.tiles.tile_size.width()))
    }

    /// Number of tile rows in all levels with the vertical index `ly`.
    pub fn num_y_tiles(&self, ly: usize) -> Result<usize> {
        Ok(RoundingMode::Up.divide(self.level_height(ly)?, self.tiles.tile_size.height()))
    }

    /// Number of tile columns and rows in the specified level.
    pub fn tile_counts(&self, level: impl Into<Vec2<usize>>) -> Result<Vec2<usize>> {
        let level = level.into();
        if !self.is_valid_level(level) {
            return Err(Error::LevelOutOfRange(level));
        }

        Ok(self.tile_counts_unchecked(level))
    }

    /// Whether the tile exists in this part.
    pub fn is_valid_tile(&self, tile: TileCoordinates) -> bool {
        self.is_valid_level(tile.level_index) && {
            let counts = self.tile_counts_unchecked(tile.level_index);
            tile.tile_index.x() < counts.x() && tile.tile_index.y() < counts.y()
        }
    }

    /// The pixel rectangle covered by a tile, in the coordinates of its level.
    /// The last tile of each row and column is clipped to the level size.
    pub fn data_window_for_tile(&self, tile: TileCoordinates) -> Result<IntegerBounds> {
        if !self.is_valid_tile(tile) {
            return Err(Error::TileCoordinateOutOfRange(tile));
        }

        let tile_size = self.tiles.tile_size;
        let level_size = self.level_size_unchecked(tile.level_index);
        let start = tile.tile_index * tile_size;

        let size = (level_size - start).min(tile_size);
        let position = self.data_window.position + start.to_i32();
        Ok(IntegerBounds::new(position, size))
    }

    /// The pixel rectangle covered by the tile `(dx, dy)` in the mip map level `(level, level)`.
    pub fn data_window_for_mip_tile(&self, dx: usize, dy: usize, level: usize) -> Result<IntegerBounds> {
        self.data_window_for_tile(TileCoordinates::new((dx, dy), (level, level)))
    }

    /// All levels of this part, in the order they appear in a file.
    pub fn levels(&self) -> impl Iterator<Item = Vec2<usize>> {
        let geometry = *self;
        let Vec2(x_levels, y_levels) = self.level_count;

        (0 .. y_levels)
            .flat_map(move |y| (0 .. x_levels).map(move |x| Vec2(x, y)))
            .filter(move |&level| geometry.is_valid_level(level))
    }

    /// All tiles of one level, row by row.
    pub fn tiles_in_level(&self, level: impl Into<Vec2<usize>>) -> Result<impl Iterator<Item = TileCoordinates>> {
        let level = level.into();
        let counts = self.tile_counts(level)?;
        Ok(tiles_of_level(level, counts, false))
    }

    /// All tiles of all levels, in the order of the offset table.
    pub fn ordered_tiles(&self) -> impl Iterator<Item = TileCoordinates> {
        self.tiles_in_line_order(LineOrder::Increasing)
    }

    /// All tiles of all levels, in the order a file with the specified line order stores them.
    /// Decreasing line order reverses the rows of every level, not the levels.
    /// Files with unspecified line order are written in increasing order when written sequentially.
    pub fn tiles_in_line_order(&self, line_order: LineOrder) -> impl Iterator<Item = TileCoordinates> {
        let geometry = *self;
        let decreasing = line_order == LineOrder::Decreasing;

        self.levels().flat_map(move |level| {
            tiles_of_level(level, geometry.tile_counts_unchecked(level), decreasing)
        })
    }

    /// Number of tiles in all levels.
    pub fn tile_count(&self) -> usize {
        let geometry = *self;
        self.levels().map(|level| geometry.tile_counts_unchecked(level).area()).sum()
    }

    /// The position of the tile in the offset table.
    pub fn offset_table_index(&self, tile: TileCoordinates) -> Result<usize> {
        if !self.is_valid_tile(tile) {
            return Err(Error::TileCoordinateOutOfRange(tile));
        }

        let geometry = *self;
        let previous_levels: usize = self.levels()
            .take_while(|&level| level != tile.level_index)
            .map(|level| geometry.tile_counts_unchecked(level).area())
            .sum();

        let columns = self.tile_counts_unchecked(tile.level_index).x();
        Ok(previous_levels + tile.tile_index.y() * columns + tile.tile_index.x())
    }

    /// The position of the tile in a file that stores its tiles in the specified line order.
    /// Equals the offset table index, except for decreasing line order.
    pub fn line_order_index(&self, tile: TileCoordinates, line_order: LineOrder) -> Result<usize> {
        let index = self.offset_table_index(tile)?;
        if line_order != LineOrder::Decreasing {
            return Ok(index);
        }

        let Vec2(columns, rows) = self.tile_counts_unchecked(tile.level_index);
        let Vec2(x, y) = tile.tile_index;

        let level_start = index - (y * columns + x);
        Ok(level_start + (rows - 1 - y) * columns + x)
    }

    fn level_size_unchecked(&self, level: Vec2<usize>) -> Vec2<usize> {
        let round = self.tiles.rounding_mode;
        let Vec2(width, height) = self.data_window.size;
        Vec2(round.level_size(width, level.x()), round.level_size(height, level.y()))
    }

    fn tile_counts_unchecked(&self, level: Vec2<usize>) -> Vec2<usize> {
        let Vec2(width, height) = self.level_size_unchecked(level);
        let tile_size = self.tiles.tile_size;

        Vec2(
            RoundingMode::Up.divide(width, tile_size.width()),
            RoundingMode::Up.divide(height, tile_size.height()),
        )
    }
}

fn tiles_of_level(level: Vec2<usize>, counts: Vec2<usize>, decreasing: bool) -> impl Iterator<Item = TileCoordinates> {
    let Vec2(columns, rows) = counts;

    (0 .. rows)
        .map(move |row| if decreasing { rows - 1 - row } else { row })
        .flat_map(move |y| (0 .. columns).map(move |x| TileCoordinates::new((x, y), level)))
}
