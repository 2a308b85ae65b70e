
//! Contains collections of common attributes.
//! Defines some data types that list all standard attributes.

use std::collections::HashMap;
use crate::meta::attribute::*;
use crate::meta::*;
use crate::math::Vec2;
use crate::geometry::LevelGeometry;

/// Describes a single tiled part of a file.
/// A file can have any number of parts, but only one of them is read by an input file.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {

    /// List of channels in this part, sorted alphabetically.
    pub channels: ChannelList,

    /// How the pixel data of all channels in this part is compressed. May be `Compression::Uncompressed`.
    pub compression: Compression,

    /// Describes how the pixels of this part are divided into tiles,
    /// and whether the file contains multiple resolution levels: mip maps or rip maps.
    pub tiles: TileDescription,

    /// In what order the tiles of this header occur in the file.
    pub line_order: LineOrder,

    /// The rectangle in global space that contains the pixels of the full resolution level.
    pub data_window: IntegerBounds,

    /// The rectangle in global space that the image is meant to be displayed in.
    pub display_window: IntegerBounds,

    /// Aspect ratio of each pixel.
    pub pixel_aspect: f32,

    /// Part of the perspective projection. Default should be `(0, 0)`.
    pub screen_window_center: Vec2<f32>,

    /// Part of the perspective projection. Default should be `1`.
    pub screen_window_width: f32,

    /// The name of this part. Required in multi-part files.
    pub name: Option<Text>,

    /// Number of tiles in the offset table of this part.
    /// Computed from the level geometry when the header is created or read.
    pub chunk_count: usize,

    /// Optional attributes. Contains custom attributes.
    /// Does not contain the standard attributes that have their own fields.
    pub custom: HashMap<Text, AttributeValue>,
}


/// The names of all the standard attributes.
/// Custom attributes must not use these names.
pub mod standard_names {
    macro_rules! define_required_attribute_names {
        ( $($name: ident  :  $value: expr),* ) => {

            /// A list containing all reserved names.
            pub const ALL: &'static [&'static [u8]] = &[
                $( $value ),*
            ];

            $(
                /// The byte-string name of this required attribute as it appears in an exr file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_required_attribute_names! {
        TILES: b"tiles",
        NAME: b"name",
        BLOCK_TYPE: b"type",
        DEEP_DATA_VERSION: b"version",
        CHUNKS: b"chunkCount",
        MAX_SAMPLES: b"maxSamplesPerPixel",
        CHANNELS: b"channels",
        COMPRESSION: b"compression",
        DATA_WINDOW: b"dataWindow",
        DISPLAY_WINDOW: b"displayWindow",
        LINE_ORDER: b"lineOrder",
        PIXEL_ASPECT: b"pixelAspectRatio",
        WINDOW_CENTER: b"screenWindowCenter",
        WINDOW_WIDTH: b"screenWindowWidth"
    }
}

/// The value of the `type` attribute of a tiled part.
pub const TILED_BLOCK_TYPE: &[u8] = b"tiledimage";


impl Header {

    /// Create a new header with the specified channels, data window and tiles.
    /// The display window equals the data window, the pixels are not compressed,
    /// and tiles are stored in increasing order.
    pub fn new(channels: ChannelList, data_window: IntegerBounds, tiles: TileDescription) -> Self {
        Header {
            chunk_count: LevelGeometry::new(tiles, data_window).tile_count(),
            compression: Compression::Uncompressed,
            line_order: LineOrder::Increasing,
            display_window: data_window,
            pixel_aspect: 1.0,
            screen_window_center: Vec2(0.0, 0.0),
            screen_window_width: 1.0,
            name: None,
            custom: HashMap::new(),
            channels, data_window, tiles,
        }
    }

    /// Set the compression method of all tiles.
    pub fn with_compression(self, compression: Compression) -> Self {
        Header { compression, .. self }
    }

    /// Set the order in which the tiles are written to the file.
    pub fn with_line_order(self, line_order: LineOrder) -> Self {
        Header { line_order, .. self }
    }

    /// Set the display window, which does not have to contain the data window.
    pub fn with_display_window(self, display_window: IntegerBounds) -> Self {
        Header { display_window, .. self }
    }

    /// Set the name of this part.
    pub fn with_name(self, name: impl Into<Text>) -> Self {
        Header { name: Some(name.into()), .. self }
    }

    /// Add a custom attribute to this header.
    pub fn with_attribute(mut self, name: impl Into<Text>, value: AttributeValue) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Look up a custom attribute by its name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.custom.get(name.as_bytes())
    }

    /// Insert or replace a custom attribute.
    /// Standard attribute names are rejected when the header is validated.
    pub fn set_attribute(&mut self, name: impl Into<Text>, value: AttributeValue) {
        self.custom.insert(name.into(), value);
    }

    /// The level and tile layout of this part.
    pub fn geometry(&self) -> LevelGeometry {
        LevelGeometry::new(self.tiles, self.data_window)
    }

    /// The maximum number of bytes that one uncompressed tile can occupy.
    pub fn max_tile_byte_size(&self) -> Result<usize> {
        self.tiles.tile_size.width()
            .checked_mul(self.tiles.tile_size.height())
            .and_then(|pixels| pixels.checked_mul(self.channels.bytes_per_pixel))
            .ok_or_else(|| Error::invalid("tile byte size exceeds the address space"))
    }

    /// Validate this instance.
    pub fn validate(&self, is_multipart: bool, long_names: &mut bool, strict: bool) -> UnitResult {
        self.data_window.validate()?;
        self.display_window.validate()?;
        self.tiles.validate()?;

        if strict && self.display_window.is_empty() {
            return Err(Error::invalid("display window must not be empty"));
        }

        if strict && !(self.pixel_aspect.is_normal() && self.pixel_aspect > 0.0) {
            return Err(Error::invalid("pixel aspect ratio"));
        }

        // tiled images never skip samples
        self.channels.validate(true)?;

        for channel in &self.channels.list {
            channel.name.validate(true, Some(long_names))?;
        }

        let computed_chunk_count = self.geometry().tile_count();
        if self.chunk_count != computed_chunk_count {
            return Err(Error::invalid("chunk count attribute does not match tile count"));
        }

        if is_multipart {
            match &self.name {
                Some(name) => name.validate(true, Some(long_names))?,
                None => return Err(missing_attribute("part name")),
            }
        }

        for (name, value) in &self.custom {
            name.validate(true, Some(long_names))?;

            if standard_names::ALL.contains(&name.bytes()) {
                return Err(Error::invalid(format!(
                    "custom attribute `{}` uses a reserved name", name
                )));
            }

            if strict {
                if let AttributeValue::Custom { kind, .. } = value {
                    kind.validate(true, Some(long_names))?;
                }
            }
        }

        Ok(())
    }

    /// Read the headers without validating them.
    pub fn read_all(read: &mut PeekRead<impl Read>, requirements: &Requirements, pedantic: bool) -> Result<Headers> {
        if !requirements.is_multipart() {
            Ok(smallvec![ Header::read(read, requirements, pedantic)? ])
        }
        else {
            let mut headers = SmallVec::new();

            while !sequence_end::has_come(read)? {
                headers.push(Header::read(read, requirements, pedantic)?);
            }

            Ok(headers)
        }
    }

    /// Without validation, write the headers to the byte stream.
    pub fn write_all(headers: &[Header], write: &mut impl Write, is_multipart: bool) -> UnitResult {
        for header in headers {
            header.write(write, is_multipart)?;
        }

        if is_multipart {
            sequence_end::write(write)?;
        }

        Ok(())
    }

    /// Read the value without validating.
    /// Attributes with unknown types are kept as custom attributes.
    /// Attributes with broken values abort reading only if `pedantic` is set.
    pub fn read(read: &mut PeekRead<impl Read>, requirements: &Requirements, pedantic: bool) -> Result<Self> {
        let max_string_len = if requirements.has_long_names { 256 } else { 32 };

        // these required attributes will be filled when encountered while parsing
        let mut tiles = None;
        let mut block_type = None;
        let mut chunk_count = None;
        let mut channels = None;
        let mut compression = None;
        let mut data_window = None;
        let mut display_window = None;
        let mut line_order = None;
        let mut pixel_aspect = 1.0;
        let mut screen_window_center = Vec2(0.0, 0.0);
        let mut screen_window_width = 1.0;
        let mut name = None;
        let mut custom = HashMap::new();

        while !sequence_end::has_come(read)? {
            let (attribute_name, value) = attribute::read(read, max_string_len)?;

            match value {
                Ok(value) => {
                    use self::standard_names as names;
                    use crate::meta::attribute::AttributeValue::*;

                    // the standard attributes will only be recognized if the type matches
                    match (attribute_name.bytes(), value) {
                        (names::BLOCK_TYPE, Text(value)) => block_type = Some(value),
                        (names::TILES, TileDescription(value)) => tiles = Some(value),
                        (names::CHANNELS, ChannelList(value)) => channels = Some(value),
                        (names::COMPRESSION, Compression(value)) => compression = Some(value),
                        (names::DATA_WINDOW, IntegerBounds(value)) => data_window = Some(value),
                        (names::DISPLAY_WINDOW, IntegerBounds(value)) => display_window = Some(value),
                        (names::LINE_ORDER, LineOrder(value)) => line_order = Some(value),
                        (names::PIXEL_ASPECT, F32(value)) => pixel_aspect = value,
                        (names::WINDOW_CENTER, FloatVec2(value)) => screen_window_center = value,
                        (names::WINDOW_WIDTH, F32(value)) => screen_window_width = value,
                        (names::NAME, Text(value)) => name = Some(value),

                        (names::CHUNKS, I32(value)) => chunk_count = Some(
                            i32_to_usize(value, "chunk count")?
                        ),

                        (names::DEEP_DATA_VERSION, _) | (names::MAX_SAMPLES, _) =>
                            return Err(Error::unsupported("deep data")),

                        (_, value) => { custom.insert(attribute_name, value); },
                    }
                },

                Err(error) => {
                    if pedantic { return Err(error); }
                }
            }
        }

        if let Some(block_type) = block_type {
            if block_type.bytes() != TILED_BLOCK_TYPE {
                return Err(Error::unsupported(format!("part type `{}`, only tiled parts are supported", block_type)));
            }
        }

        let tiles = tiles.ok_or_else(|| Error::invalid("file is not tiled"))?;
        tiles.validate()?;
        let channels = channels.ok_or_else(|| missing_attribute("channels"))?;
        let compression = compression.ok_or_else(|| missing_attribute("compression"))?;
        let data_window = data_window.ok_or_else(|| missing_attribute("data window"))?;
        let display_window = display_window.ok_or_else(|| missing_attribute("display window"))?;
        let line_order = line_order.ok_or_else(|| missing_attribute("line order"))?;

        let chunk_count = match chunk_count {
            Some(count) => count,
            None if requirements.is_multipart() => return Err(missing_attribute("chunk count")),
            None => LevelGeometry::new(tiles, data_window).tile_count(),
        };

        Ok(Header {
            channels, compression, tiles, line_order, data_window, display_window,
            pixel_aspect, screen_window_center, screen_window_width,
            name, chunk_count, custom,
        })
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write(&self, write: &mut impl Write, is_multipart: bool) -> UnitResult {
        use self::standard_names as names;
        use crate::meta::attribute::AttributeValue::*;

        attribute::write(names::CHANNELS, &ChannelList(self.channels.clone()), write)?;
        attribute::write(names::COMPRESSION, &Compression(self.compression), write)?;
        attribute::write(names::DATA_WINDOW, &IntegerBounds(self.data_window), write)?;
        attribute::write(names::DISPLAY_WINDOW, &IntegerBounds(self.display_window), write)?;
        attribute::write(names::LINE_ORDER, &LineOrder(self.line_order), write)?;
        attribute::write(names::PIXEL_ASPECT, &F32(self.pixel_aspect), write)?;
        attribute::write(names::WINDOW_CENTER, &FloatVec2(self.screen_window_center), write)?;
        attribute::write(names::WINDOW_WIDTH, &F32(self.screen_window_width), write)?;
        attribute::write(names::TILES, &TileDescription(self.tiles), write)?;

        if let Some(name) = &self.name {
            attribute::write(names::NAME, &Text(name.clone()), write)?;
        }

        if is_multipart {
            attribute::write(names::BLOCK_TYPE, &Text(attribute::Text::from_slice_unchecked(TILED_BLOCK_TYPE)), write)?;
            attribute::write(names::CHUNKS, &I32(usize_to_i32(self.chunk_count, "chunk count")?), write)?;
        }

        for (name, value) in &self.custom {
            attribute::write(name.bytes(), value, write)?;
        }

        sequence_end::write(write)?;
        Ok(())
    }
}
