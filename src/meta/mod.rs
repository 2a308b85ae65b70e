
//! Describes all meta data possible in a tiled exr file.
//! Contains functionality to read and write meta data from bytes.

pub mod attribute;
pub mod header;


use crate::io::*;
use ::smallvec::SmallVec;
use crate::error::*;
use std::collections::HashSet;
use self::header::Header;


/// Contains the complete meta data of an exr file.
/// Defines how the pixels are split up into tiles in the file,
/// the number and type of channels,
/// and various other attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaData {

    /// Some flags summarizing the features that must be supported to decode the file.
    pub requirements: Requirements,

    /// One header to describe each part in this file.
    pub headers: Headers,
}


/// List of `Header`s.
pub type Headers = SmallVec<[Header; 3]>;


/// A summary of requirements that must be met to read this exr file.
/// Used to determine whether this file can be read by a given reader.
/// It includes the OpenEXR version number. This library aims to support version `2.0`.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Requirements {

    /// This library supports reading version 1 and 2, and writing version 2.
    file_format_version: u8,

    /// If true, this file contains a single tiled part.
    is_single_part_and_tiled: bool,

    /// Whether this file has strings with a length greater than 31.
    /// Strings can never be longer than 255.
    has_long_names: bool,

    /// This file contains at least one part with deep data.
    has_deep_data: bool,

    /// Whether this file contains multiple parts.
    is_multipart: bool,
}


/// The first four bytes of each exr file.
/// Used to abort reading non-exr files.
pub mod magic_number {
    use super::*;

    /// The first four bytes of each exr file.
    pub const BYTES: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

    /// Without validation, write this instance to the byte stream.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice_le(write, &self::BYTES)
    }

    /// Consumes four bytes from the reader and returns whether the file may be an exr file.
    pub fn is_exr(read: &mut impl Read) -> Result<bool> {
        let mut magic_num = [0; 4];
        u8::read_slice_le(read, &mut magic_num)?;
        Ok(magic_num == self::BYTES)
    }

    /// Validate this image. If it is an exr file, return `Ok(())`.
    pub fn validate_exr(read: &mut impl Read) -> UnitResult {
        if self::is_exr(read)? {
            Ok(())

        } else {
            Err(Error::invalid("file identifier missing"))
        }
    }
}

/// A `0_u8` at the end of a sequence.
pub mod sequence_end {
    use super::*;

    /// Number of bytes this would consume in an exr file.
    pub fn byte_size() -> usize {
        1
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(write: &mut W) -> UnitResult {
        0_u8.write_le(write)
    }

    /// Peeks the next byte. If it is zero, consumes the byte and returns true.
    pub fn has_come(read: &mut PeekRead<impl Read>) -> Result<bool> {
        Ok(read.skip_if_eq(0)?)
    }
}

fn missing_attribute(name: &str) -> Error {
    Error::invalid(format!("missing or invalid {} attribute", name))
}


impl MetaData {

    /// Infers version requirements from headers.
    pub fn new(headers: Headers) -> Self {
        MetaData {
            requirements: Requirements::infer(headers.as_slice()),
            headers
        }
    }

    /// Read and validate the meta data of a file.
    /// Does not read the offset tables.
    pub(crate) fn read_validated(read: &mut PeekRead<impl Read>, max_pixel_bytes: Option<usize>, pedantic: bool) -> Result<Self> {
        magic_number::validate_exr(read)?;
        let requirements = Requirements::read(read)?;
        requirements.validate()?;

        let headers = Header::read_all(read, &requirements, pedantic)?;
        let meta_data = MetaData { requirements, headers };

        // relaxed validation to allow slightly invalid files
        // that still can be read correctly
        meta_data.validate(max_pixel_bytes, pedantic)?;
        Ok(meta_data)
    }

    /// Validates the meta data and writes it to the stream.
    /// If pedantic, throws errors for files that may produce errors in other exr readers.
    pub(crate) fn write_validating(&self, write: &mut impl Write, pedantic: bool) -> UnitResult {
        self.validate(None, pedantic)?;

        magic_number::write(write)?;
        self.requirements.write(write)?;
        Header::write_all(self.headers.as_slice(), write, self.requirements.is_multipart)?;
        Ok(())
    }

    /// Validates this meta data.
    /// Set strict to false when reading and true when writing for maximum compatibility.
    pub fn validate(&self, max_pixel_bytes: Option<usize>, strict: bool) -> UnitResult {
        self.requirements.validate()?;

        let headers = self.headers.len();
        if headers == 0 {
            return Err(Error::invalid("at least one part is required"));
        }

        if !self.requirements.is_multipart && headers != 1 {
            return Err(Error::invalid("multipart flag for header count"));
        }

        let mut long_names = false;
        for header in &self.headers {
            header.validate(self.requirements.is_multipart, &mut long_names, strict)?;
        }

        if strict && long_names && !self.requirements.has_long_names {
            return Err(Error::invalid("long names flag is not set"));
        }

        if let Some(max) = max_pixel_bytes {
            let byte_size: usize = self.headers.iter()
                .map(|header| header.data_window.size.area() * header.channels.bytes_per_pixel)
                .sum();

            if byte_size > max {
                return Err(Error::invalid("image larger than specified maximum"));
            }
        }

        if self.requirements.is_multipart {
            let mut names = HashSet::with_capacity(headers);
            for header in &self.headers {
                if !names.insert(&header.name) {
                    return Err(Error::invalid("duplicate part name"));
                }
            }
        }

        Ok(())
    }
}


impl Requirements {

    /// Infer version requirements from headers.
    pub fn infer(headers: &[Header]) -> Self {
        let is_multipart = headers.len() > 1;

        // validation errors are reported separately, so they are ignored here
        let mut has_long_names = false;
        for header in headers {
            let _ = header.validate(is_multipart, &mut has_long_names, false);
        }

        Requirements {
            file_format_version: 2,
            is_single_part_and_tiled: !is_multipart,
            has_long_names,
            has_deep_data: false,
            is_multipart,
        }
    }

    // this is actually used for control flow, as the number of headers may be 1 in a multipart file
    /// Is this file declared to contain multiple parts?
    pub fn is_multipart(&self) -> bool {
        self.is_multipart
    }

    /// Whether this file may contain attribute names longer than 31 bytes.
    pub fn has_long_names(&self) -> bool {
        self.has_long_names
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use ::bit_field::BitField;

        let version_and_flags = u32::read_le(read)?;

        // take the 8 least significant bits, they contain the file format version number
        let version = (version_and_flags & 0x00FF) as u8;

        // the 24 most significant bits are treated as a set of boolean flags
        let is_single_tile = version_and_flags.get_bit(9);
        let has_long_names = version_and_flags.get_bit(10);
        let has_deep_data = version_and_flags.get_bit(11);
        let is_multipart = version_and_flags.get_bit(12);

        // all remaining bits except 9, 10, 11 and 12 are reserved and should be 0
        // if a file has any of these bits set to 1, it means this file contains
        // a feature that we don't support
        let unknown_flags = version_and_flags >> 13;

        if unknown_flags != 0 {
            return Err(Error::unsupported("too new file feature flags"));
        }

        Ok(Requirements {
            file_format_version: version,
            is_single_part_and_tiled: is_single_tile, has_long_names,
            has_deep_data, is_multipart,
        })
    }

    /// The version number in the lowest byte, followed by the feature flags.
    pub fn version_and_flags(self) -> u32 {
        use ::bit_field::BitField;

        // the 8 least significant bits contain the file format version number
        // and the flags are set to 0
        let mut version_and_flags = self.file_format_version as u32;

        // the 24 most significant bits are treated as a set of boolean flags
        version_and_flags.set_bit(9, self.is_single_part_and_tiled);
        version_and_flags.set_bit(10, self.has_long_names);
        version_and_flags.set_bit(11, self.has_deep_data);
        version_and_flags.set_bit(12, self.is_multipart);
        version_and_flags
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        self.version_and_flags().write_le(write)
    }

    /// Validate this instance.
    /// Rejects every file that does not consist of tiled parts.
    pub fn validate(&self) -> UnitResult {
        if self.has_deep_data {
            return Err(Error::unsupported("deep data"));
        }

        if let 1..=2 = self.file_format_version {
            match (self.is_single_part_and_tiled, self.is_multipart, self.file_format_version) {

                // Single-part tile. One normal tiled image.
                (true, false, 1..=2) => Ok(()),

                // Multi-part (new in 2.0). Each part declares its own type.
                (false, true, 2) => Ok(()),

                // Single-part scan line image.
                (false, false, _) => Err(Error::invalid("file is not tiled")),

                _ => Err(Error::invalid("file feature flags"))
            }
        }
        else {
            Err(Error::unsupported("file version newer than `2.0`"))
        }
    }
}
