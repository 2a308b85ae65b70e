//! Write tiled files with every supported compression method and read them back.

extern crate exr_tiles;

use exr_tiles::prelude::*;
use std::io::Cursor;


fn header(compression: Compression, level_mode: LevelMode, rounding_mode: RoundingMode) -> Header {
    let channels = ChannelList::new(smallvec::smallvec![
        ChannelDescription::new("R", SampleType::U32, false),
        ChannelDescription::new("G", SampleType::F32, false),
        ChannelDescription::new("B", SampleType::F16, false),
    ]);

    let tiles = TileDescription { tile_size: Vec2(8, 4), level_mode, rounding_mode };
    Header::new(channels, IntegerBounds::new((-3, 5), (37, 21)), tiles).with_compression(compression)
}

/// Small integers, which every sample type represents exactly.
/// Long runs of equal values let run length encoding do some work.
fn sample(channel: usize, x: i32, y: i32, level: Vec2<usize>) -> f32 {
    let value = (x / 3 + y * 5 + channel as i32 * 7 + level.x() as i32 * 11 + level.y() as i32 * 13).rem_euclid(64);
    value as f32
}

/// One f32 buffer per channel, covering the data window of the level.
struct LevelPixels {
    window: IntegerBounds,
    channels: Vec<Vec<f32>>,
}

impl LevelPixels {
    fn new(window: IntegerBounds, channel_count: usize) -> Self {
        LevelPixels { window, channels: vec![ vec![ 0.0; window.size.area() ]; channel_count ] }
    }

    fn generated(window: IntegerBounds, channel_count: usize, level: Vec2<usize>) -> Self {
        let mut pixels = Self::new(window, channel_count);

        for (channel, samples) in pixels.channels.iter_mut().enumerate() {
            for y in 0 .. window.size.height() {
                for x in 0 .. window.size.width() {
                    let position = window.position + Vec2(x as i32, y as i32);
                    samples[y * window.size.width() + x] = sample(channel, position.x(), position.y(), level);
                }
            }
        }

        pixels
    }

    fn frame_buffer(&mut self, names: &[&str]) -> FrameBuffer {
        let window = self.window;

        names.iter().zip(self.channels.iter_mut())
            .fold(FrameBuffer::new(), |frame_buffer, (&name, samples)| {
                frame_buffer.with_slice(name, unsafe {
                    Slice::packed(SampleType::F32, samples.as_mut_ptr() as *mut u8, window, 0.0)
                })
            })
    }
}

const NAMES: [&str; 3] = [ "B", "G", "R" ];

fn write_all_levels(header: Header, threads: usize) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());

    {
        let options = WriteOptions::default().with_thread_count(threads);
        let mut output = TiledOutputFile::from_buffered(&mut bytes, header, options).unwrap();
        let levels: Vec<Vec2<usize>> = output.geometry().levels().collect();

        for level in levels {
            let window = output.data_window_for_level(level).unwrap();
            let mut pixels = LevelPixels::generated(window, NAMES.len(), level);
            output.set_frame_buffer(pixels.frame_buffer(&NAMES)).unwrap();

            let columns = output.num_x_tiles(level.x()).unwrap();
            let rows = output.num_y_tiles(level.y()).unwrap();
            output.write_tiles(0 ..= columns - 1, 0 ..= rows - 1, level).unwrap();
        }

        assert!(output.is_complete());
        output.finish().unwrap();
    }

    bytes.into_inner()
}

fn check_all_levels(bytes: Vec<u8>, threads: usize) {
    let options = ReadOptions::default().with_thread_count(threads).pedantic();
    let mut input = TiledInputFile::from_buffered(Cursor::new(bytes), options).unwrap();
    assert!(input.is_complete());

    let levels: Vec<Vec2<usize>> = input.geometry().levels().collect();
    assert!(!levels.is_empty());

    for level in levels {
        let window = input.data_window_for_level(level).unwrap();
        let expected = LevelPixels::generated(window, NAMES.len(), level);
        let mut pixels = LevelPixels::new(window, NAMES.len());

        input.set_frame_buffer(pixels.frame_buffer(&NAMES)).unwrap();

        let columns = input.num_x_tiles(level.x()).unwrap();
        let rows = input.num_y_tiles(level.y()).unwrap();
        input.read_tiles(0 ..= columns - 1, 0 ..= rows - 1, level).unwrap();

        assert_eq!(pixels.channels, expected.channels, "level {}", level);
    }
}

fn round_trip(compression: Compression, level_mode: LevelMode) {
    let header = header(compression, level_mode, RoundingMode::Down);
    let bytes = write_all_levels(header, 4);
    check_all_levels(bytes, 4);
}

#[test]
fn uncompressed() { round_trip(Compression::Uncompressed, LevelMode::MipMap) }

#[test]
fn rle() { round_trip(Compression::RLE, LevelMode::MipMap) }

#[test]
fn zip1() { round_trip(Compression::ZIP1, LevelMode::MipMap) }

#[test]
fn zip16() { round_trip(Compression::ZIP16, LevelMode::MipMap) }

#[test]
fn zip16_rip_map() { round_trip(Compression::ZIP16, LevelMode::RipMap) }

#[test]
fn rle_single_level() { round_trip(Compression::RLE, LevelMode::Singular) }

#[test]
fn rounding_up_levels(){
    let header = header(Compression::ZIP1, LevelMode::RipMap, RoundingMode::Up);
    let bytes = write_all_levels(header, 1);
    check_all_levels(bytes, 1);
}

#[test]
fn compressed_files_are_smaller(){
    let raw = write_all_levels(header(Compression::Uncompressed, LevelMode::MipMap, RoundingMode::Down), 1);
    let zip = write_all_levels(header(Compression::ZIP16, LevelMode::MipMap, RoundingMode::Down), 1);
    assert!(zip.len() < raw.len());
}

#[test]
fn unsupported_compression_fails_per_tile(){
    let header = header(Compression::PIZ, LevelMode::Singular, RoundingMode::Down);
    let window = header.data_window;

    let mut bytes = Cursor::new(Vec::new());
    let mut output = TiledOutputFile::from_buffered(&mut bytes, header, WriteOptions::default()).unwrap();

    let mut pixels = LevelPixels::generated(window, NAMES.len(), Vec2(0, 0));
    output.set_frame_buffer(pixels.frame_buffer(&NAMES)).unwrap();

    let result = output.write_tile(TileCoordinates::new((0, 0), (0, 0)));
    assert!(matches!(result, Err(Error::NotSupported(_))), "{:?}", result);
    assert!(!output.is_complete());
}
