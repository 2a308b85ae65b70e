//! Describes where the pixels of each channel are located in memory.
//!
//! A frame buffer does not own any pixels. It contains one raw pointer for each channel,
//! along with the distance in bytes between horizontally and vertically adjacent samples.
//! Reading tiles writes through these pointers, and writing tiles reads through them.
//! This is why creating a `Slice` is `unsafe`: the memory for every pixel of the data window
//! must stay valid and must not be accessed otherwise during each call that transfers tiles.

use std::collections::BTreeMap;
use half::f16;
use crate::io::Data;
use crate::math::Vec2;
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType, Text};
use crate::error::{Error, Result, UnitResult};


/// A single sample value of one channel.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Sample {

    /// A 16-bit float sample.
    F16(f16),

    /// A 32-bit float sample.
    F32(f32),

    /// An unsigned integer sample.
    U32(u32)
}

/// The memory of a single channel.
/// Points at pixel `(0, 0)` of the global coordinate system,
/// which does not need to be inside the data window.
#[derive(Clone, Copy, Debug)]
pub struct Slice {

    /// The type that samples have in memory.
    /// Will be converted from and to the sample type of the file.
    pub sample_type: SampleType,

    base: *mut u8,

    /// Distance in bytes between horizontally and vertically adjacent samples.
    stride: Vec2<isize>,

    /// The value written to this slice for every pixel of a tile
    /// if the file does not contain this channel.
    pub fill_value: f64,
}

// the creator of a slice guarantees that no one else accesses the memory during tile transfers,
// and tiles never overlap, so different threads never access the same sample
unsafe impl Send for Slice {}

unsafe impl Sync for Slice {}


/// Maps channel names to the memory of that channel.
/// Names are case sensitive.
#[derive(Clone, Debug, Default)]
pub struct FrameBuffer {
    slices: BTreeMap<Text, Slice>,
}


impl Sample {

    /// Convert the sample to an f16 value. This has lower precision than f32.
    #[inline]
    pub fn to_f16(self) -> f16 {
        match self {
            Sample::F16(sample) => sample,
            Sample::F32(sample) => f16::from_f32(sample),
            Sample::U32(sample) => f16::from_f32(sample as f32),
        }
    }

    /// Convert the sample to an f32 value.
    /// Note: An f32 can only represent integers up to `8388608` as precise as a u32 could.
    #[inline]
    pub fn to_f32(self) -> f32 {
        match self {
            Sample::F32(sample) => sample,
            Sample::F16(sample) => sample.to_f32(),
            Sample::U32(sample) => sample as f32,
        }
    }

    /// Convert the sample to a u32. Rounds floats to integers the same way that `3.1 as u32` does.
    #[inline]
    pub fn to_u32(self) -> u32 {
        match self {
            Sample::F16(sample) => sample.to_f32() as u32,
            Sample::F32(sample) => sample as u32,
            Sample::U32(sample) => sample,
        }
    }

    /// Convert a double precision value to a sample of the specified type.
    pub fn from_f64(value: f64, sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::F16 => Sample::F16(f16::from_f64(value)),
            SampleType::F32 => Sample::F32(value as f32),
            SampleType::U32 => Sample::U32(value as u32),
        }
    }

    /// Convert this sample to the specified type.
    #[inline]
    pub fn convert(self, sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::F16 => Sample::F16(self.to_f16()),
            SampleType::F32 => Sample::F32(self.to_f32()),
            SampleType::U32 => Sample::U32(self.to_u32()),
        }
    }

    /// Read a little-endian sample of the specified type, advancing the byte slice.
    fn read_le(bytes: &mut &[u8], sample_type: SampleType) -> Result<Self> {
        Ok(match sample_type {
            SampleType::F16 => Sample::F16(f16::read_le(bytes)?),
            SampleType::F32 => Sample::F32(f32::read_le(bytes)?),
            SampleType::U32 => Sample::U32(u32::read_le(bytes)?),
        })
    }

    /// Append this sample in little-endian byte order.
    fn write_le(self, bytes: &mut Vec<u8>) -> UnitResult {
        match self {
            Sample::F16(value) => value.write_le(bytes),
            Sample::F32(value) => value.write_le(bytes),
            Sample::U32(value) => value.write_le(bytes),
        }
    }
}

impl From<f16> for Sample { #[inline] fn from(f: f16) -> Self { Sample::F16(f) } }
impl From<f32> for Sample { #[inline] fn from(f: f32) -> Self { Sample::F32(f) } }
impl From<u32> for Sample { #[inline] fn from(f: u32) -> Self { Sample::U32(f) } }


impl Slice {

    /// Describe the memory of one channel.
    /// The sample of pixel `(x, y)` is located at `base + x * x_stride + y * y_stride`,
    /// where `x` and `y` are global coordinates, as used by the data window.
    ///
    /// # Safety
    /// For every pixel inside the data window of the file, the computed address must point to
    /// memory that is valid for reads and writes of `sample_type`,
    /// as long as this slice is part of a frame buffer that is used to transfer tiles.
    /// The addresses do not need to be aligned.
    /// During a tile transfer, that memory must not be accessed by anything else.
    pub unsafe fn new(sample_type: SampleType, base: *mut u8, x_stride: isize, y_stride: isize, fill_value: f64) -> Self {
        debug_assert!(!base.is_null(), "frame buffer slice base pointer must not be null");
        debug_assert!(x_stride != 0 && y_stride != 0, "frame buffer slice strides must not be zero");

        Slice { sample_type, base, stride: Vec2(x_stride, y_stride), fill_value }
    }

    /// Describe the memory of one channel, where `first_pixel` points at
    /// the top left pixel of the data window instead of the global origin.
    ///
    /// # Safety
    /// Has the same requirements as `Slice::new`.
    pub unsafe fn for_data_window(
        sample_type: SampleType, first_pixel: *mut u8, data_window: IntegerBounds,
        x_stride: isize, y_stride: isize, fill_value: f64
    ) -> Self
    {
        let Vec2(x, y) = data_window.position;
        let origin_offset = x as isize * x_stride + y as isize * y_stride;

        // the global origin may be outside of the allocation
        let base = first_pixel.wrapping_offset(-origin_offset);
        Self::new(sample_type, base, x_stride, y_stride, fill_value)
    }

    /// Describe a densely packed buffer that contains one sample per pixel of the data window,
    /// row by row.
    ///
    /// # Safety
    /// The pointer must be valid for `data_window.size.area()` samples of the specified type.
    /// Has the same requirements as `Slice::new` otherwise.
    pub unsafe fn packed(sample_type: SampleType, first_pixel: *mut u8, data_window: IntegerBounds, fill_value: f64) -> Self {
        let x_stride = sample_type.bytes_per_sample() as isize;
        let y_stride = x_stride * data_window.size.width().max(1) as isize;
        Self::for_data_window(sample_type, first_pixel, data_window, x_stride, y_stride, fill_value)
    }

    /// Distance in bytes between horizontally adjacent samples.
    pub fn x_stride(&self) -> isize { self.stride.x() }

    /// Distance in bytes between vertically adjacent samples.
    pub fn y_stride(&self) -> isize { self.stride.y() }

    fn sample_pointer(&self, position: Vec2<i32>) -> *mut u8 {
        let offset = position.x() as isize * self.stride.x() + position.y() as isize * self.stride.y();
        self.base.wrapping_offset(offset)
    }

    /// Store a sample of the pixel, converted to the sample type of this slice.
    /// The pixel must be inside the data window.
    fn write_sample(&self, position: Vec2<i32>, sample: Sample) {
        let pointer = self.sample_pointer(position);

        // validity of the pointer was guaranteed when this slice was created
        unsafe {
            match self.sample_type {
                SampleType::F16 => (pointer as *mut f16).write_unaligned(sample.to_f16()),
                SampleType::F32 => (pointer as *mut f32).write_unaligned(sample.to_f32()),
                SampleType::U32 => (pointer as *mut u32).write_unaligned(sample.to_u32()),
            }
        }
    }

    /// Load the sample of the pixel, in the sample type of this slice.
    /// The pixel must be inside the data window.
    fn read_sample(&self, position: Vec2<i32>) -> Sample {
        let pointer = self.sample_pointer(position);

        // validity of the pointer was guaranteed when this slice was created
        unsafe {
            match self.sample_type {
                SampleType::F16 => Sample::F16((pointer as *const f16).read_unaligned()),
                SampleType::F32 => Sample::F32((pointer as *const f32).read_unaligned()),
                SampleType::U32 => Sample::U32((pointer as *const u32).read_unaligned()),
            }
        }
    }
}


impl FrameBuffer {

    /// A frame buffer without any slices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slice for the channel with that name, returning the previous slice of that channel.
    pub fn insert(&mut self, channel_name: impl Into<Text>, slice: Slice) -> Option<Slice> {
        self.slices.insert(channel_name.into(), slice)
    }

    /// Add a slice for the channel with that name.
    pub fn with_slice(mut self, channel_name: impl Into<Text>, slice: Slice) -> Self {
        self.insert(channel_name, slice);
        self
    }

    /// The slice of the channel with that name.
    pub fn get(&self, channel_name: &str) -> Option<&Slice> {
        self.slices.get(channel_name.as_bytes())
    }

    /// Remove the slice of the channel with that name.
    pub fn remove(&mut self, channel_name: &str) -> Option<Slice> {
        self.slices.remove(channel_name.as_bytes())
    }

    /// All slices, sorted by channel name.
    pub fn iter(&self) -> impl Iterator<Item = (&Text, &Slice)> {
        self.slices.iter()
    }

    /// Number of slices.
    pub fn len(&self) -> usize { self.slices.len() }

    /// Whether this frame buffer contains no slices.
    pub fn is_empty(&self) -> bool { self.slices.is_empty() }

    /// Check that each channel of the file has a slice.
    pub fn validate(&self, channels: &ChannelList) -> UnitResult {
        match channels.list.iter().find(|channel| !self.slices.contains_key(&channel.name)) {
            Some(channel) => Err(Error::MissingChannelBinding(channel.name.clone())),
            None => Ok(())
        }
    }

    /// Distribute the decompressed little-endian samples of one tile to the slices.
    /// Slices of channels which the file does not contain are filled with their fill value.
    /// The tile rectangle must be inside the data window.
    pub(crate) fn scatter_tile(&self, channels: &ChannelList, tile: IntegerBounds, mut bytes: &[u8]) -> UnitResult {
        let channel_slices = self.channel_slices(channels)?;

        for y in tile.position.y() .. tile.end().y() {
            for (channel, slice) in channels.list.iter().zip(&channel_slices) {
                for x in tile.position.x() .. tile.end().x() {
                    let sample = Sample::read_le(&mut bytes, channel.sample_type)?;
                    slice.write_sample(Vec2(x, y), sample);
                }
            }
        }

        if !bytes.is_empty() {
            return Err(Error::invalid("tile contains too many bytes"));
        }

        for (name, slice) in &self.slices {
            if channels.find_index_of_channel(name).is_none() {
                let fill = Sample::from_f64(slice.fill_value, slice.sample_type);

                for y in tile.position.y() .. tile.end().y() {
                    for x in tile.position.x() .. tile.end().x() {
                        slice.write_sample(Vec2(x, y), fill);
                    }
                }
            }
        }

        Ok(())
    }

    /// Collect the samples of one tile from the slices, as little-endian bytes in the file layout.
    /// Slices of channels which the file does not contain are ignored.
    /// The tile rectangle must be inside the data window.
    pub(crate) fn gather_tile(&self, channels: &ChannelList, tile: IntegerBounds) -> Result<Vec<u8>> {
        let channel_slices = self.channel_slices(channels)?;
        let mut bytes = Vec::with_capacity(tile.size.area() * channels.bytes_per_pixel);

        for y in tile.position.y() .. tile.end().y() {
            for (channel, slice) in channels.list.iter().zip(&channel_slices) {
                for x in tile.position.x() .. tile.end().x() {
                    slice.read_sample(Vec2(x, y))
                        .convert(channel.sample_type)
                        .write_le(&mut bytes)?;
                }
            }
        }

        Ok(bytes)
    }

    fn channel_slices(&self, channels: &ChannelList) -> Result<Vec<&Slice>> {
        channels.list.iter()
            .map(|channel| self.slices.get(&channel.name).ok_or_else(|| Error::MissingChannelBinding(channel.name.clone())))
            .collect()
    }
}
