
//! Read and write tiled, multi-resolution OpenEXR files.
//!
//! A tiled part divides its pixels into rectangular tiles, optionally for several resolution levels
//! (mip maps or rip maps). Each tile is stored as an independently compressed chunk, located by an offset table.
//! Tiles are read into and written from caller-owned memory, described by a `FrameBuffer`,
//! and are compressed or decompressed on a thread pool.
//!
//! Start with `TiledInputFile::open` or `TiledOutputFile::create`.
//! All level and tile computations are available without any file through `LevelGeometry`.

#![cfg_attr(not(test), deny(unsafe_code))]
#![forbid(
    clippy::all,
    clippy::restriction,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
)]

#![warn(missing_docs)]


#[macro_use]
extern crate smallvec;

pub mod io;
pub mod math;
pub mod error;
pub mod meta;
pub mod compression;
pub mod chunk;

#[macro_use]
pub mod geometry;

pub mod offsets;

#[allow(unsafe_code)]
pub mod frame_buffer;

mod parallel;
pub mod input;
pub mod output;


/// Export the most important items from `exr-tiles`.
/// _Note: This includes a type called `Result`, possibly overwriting the default `std::Result` type usage._
pub mod prelude {

    // main exports
    pub use crate::input::{TiledInputFile, ReadOptions};
    pub use crate::output::{TiledOutputFile, WriteOptions};
    pub use crate::frame_buffer::{FrameBuffer, Slice, Sample};
    pub use crate::geometry::LevelGeometry;
    pub use crate::chunk::TileCoordinates;

    // secondary data types
    pub use crate::meta::MetaData;
    pub use crate::meta::header::Header;
    pub use crate::meta::attribute::{
        AttributeValue, ChannelDescription, ChannelList, Compression, IntegerBounds,
        LevelMode, LineOrder, SampleType, Text, TileDescription,
    };

    pub use crate::math::{Vec2, RoundingMode};
    pub use crate::error::{Error, Result, UnitResult};

    // re-export external stuff
    pub use half::f16;
}
