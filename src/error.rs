
//! Error type definitions.

use std::borrow::Cow;
use std::io::ErrorKind;
use std::convert::TryFrom;
use std::error;
use std::fmt;
use crate::math::Vec2;
use crate::chunk::TileCoordinates;
use crate::meta::attribute::Text;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// A result that may contain an exr error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an exr error.
pub type UnitResult = Result<()>;


/// An error that may happen while reading or writing a tiled exr file.
/// Distinguishes between the possible causes, so that a caller can
/// react to invalid requests differently than to broken files.
#[derive(Debug)]
pub enum Error {

    /// The contents of the file are not supported by this implementation.
    /// The file itself may still be valid.
    NotSupported(Cow<'static, str>),

    /// The contents of the file are not valid or not tiled,
    /// or the header is truncated.
    Invalid(Cow<'static, str>),

    /// A single level count was requested for a rip map,
    /// where x and y level counts may differ.
    InvalidLevelMode,

    /// The requested resolution level does not exist in this file.
    LevelOutOfRange(Vec2<usize>),

    /// The requested tile does not exist in this file.
    TileCoordinateOutOfRange(TileCoordinates),

    /// A channel of the file has no slice in the bound frame buffer.
    MissingChannelBinding(Text),

    /// The tile has already been written to this file.
    DuplicateTile(TileCoordinates),

    /// The compressed bytes of a tile could not be decompressed,
    /// or the pixels could not be compressed.
    Codec(Cow<'static, str>),

    /// The underlying byte stream failed.
    Io(IoError),
}


impl Error {

    /// Create an error of the variant `Invalid`.
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error of the variant `NotSupported`.
    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::NotSupported(message.into())
    }

    /// Create an error of the variant `Codec`.
    pub(crate) fn codec(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Codec(message.into())
    }

    /// A tile slot that exists in the offset table but was never written.
    pub(crate) fn missing_tile(coordinates: TileCoordinates) -> Self {
        Error::Io(IoError::new(
            ErrorKind::UnexpectedEof,
            format!("tile {} has not been written to the file", coordinates)
        ))
    }

    /// Another thread panicked while accessing the byte stream.
    pub(crate) fn poisoned() -> Self {
        Error::Io(IoError::new(ErrorKind::Other, "byte stream lock poisoned"))
    }
}

/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        if error.kind() == ErrorKind::UnexpectedEof {
            Error::invalid("reference to missing bytes")
        }
        else {
            Error::Io(error)
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(formatter),
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid: {}", message),
            Error::InvalidLevelMode => write!(formatter, "level count is ambiguous for rip maps"),
            Error::LevelOutOfRange(level) => write!(formatter, "level ({}, {}) does not exist", level.x(), level.y()),
            Error::TileCoordinateOutOfRange(tile) => write!(formatter, "tile {} does not exist", tile),
            Error::MissingChannelBinding(name) => write!(formatter, "no frame buffer slice for channel `{}`", name),
            Error::DuplicateTile(tile) => write!(formatter, "tile {} has already been written", tile),
            Error::Codec(message) => write!(formatter, "codec: {}", message),
        }
    }
}


/// Return error on invalid range.
#[inline]
pub(crate) fn i32_to_usize(value: i32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        if value < 0 { Error::invalid(error_message) }
        else { Error::unsupported(error_message) }
    })
}

/// Return error on invalid range.
#[inline]
pub(crate) fn usize_to_i32(value: usize, error_message: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::unsupported(error_message))
}

/// Return error on invalid range.
#[inline]
pub(crate) fn u64_to_usize(value: u64, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::unsupported(error_message))
}

/// Panics on overflow, which can only happen on exotic platforms.
#[inline]
pub(crate) fn usize_to_u64(value: usize) -> u64 {
    u64::try_from(value).expect("(usize as u64) overflowed")
}
