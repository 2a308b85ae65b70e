//! Write tiled files in various ways and check what is read back.

extern crate exr_tiles;

use exr_tiles::prelude::*;
use std::io::{Cursor, ErrorKind};
use rand::Rng;


fn tile(x: usize, y: usize) -> TileCoordinates {
    TileCoordinates::new((x, y), (0, 0))
}

fn luma_header(size: (usize, usize), tile_size: (usize, usize), level_mode: LevelMode) -> Header {
    Header::new(
        ChannelList::new(smallvec::smallvec![ ChannelDescription::new("Y", SampleType::F16, true) ]),
        IntegerBounds::from_dimensions(size),
        TileDescription { tile_size: tile_size.into(), level_mode, rounding_mode: RoundingMode::Down }
    )
}

/// A frame buffer that points at the samples, which must cover the data window.
fn luma_frame_buffer(samples: &mut [f32], window: IntegerBounds) -> FrameBuffer {
    assert_eq!(samples.len(), window.size.area());

    FrameBuffer::new().with_slice("Y", unsafe {
        Slice::packed(SampleType::F32, samples.as_mut_ptr() as *mut u8, window, 0.0)
    })
}

fn random_luma(count: usize) -> Vec<f32> {
    let mut random = rand::rng();
    (0 .. count).map(|_| f16::from_f32(random.random_range(-100.0 .. 100.0)).to_f32()).collect()
}

/// Writes the full resolution level with the specified tile order, without finishing the file.
fn write_luma_tiles<'b>(
    bytes: &'b mut Cursor<Vec<u8>>, header: Header, luma: &mut [f32], tiles: &[TileCoordinates]
) -> TiledOutputFile<&'b mut Cursor<Vec<u8>>>
{
    let window = header.data_window;
    let mut output = TiledOutputFile::from_buffered(bytes, header, WriteOptions::default()).unwrap();
    output.set_frame_buffer(luma_frame_buffer(luma, window)).unwrap();
    output.write_tile_batch(tiles).unwrap();
    output
}

fn read_luma(bytes: Vec<u8>, threads: usize) -> Vec<f32> {
    let options = ReadOptions::default().with_thread_count(threads);
    let mut input = TiledInputFile::from_buffered(Cursor::new(bytes), options).unwrap();

    let window = input.header().data_window;
    let mut luma = vec![ f32::NAN; window.size.area() ];
    input.set_frame_buffer(luma_frame_buffer(&mut luma, window)).unwrap();

    let (columns, rows) = (input.num_x_tiles(0).unwrap(), input.num_y_tiles(0).unwrap());
    input.read_tiles(0 ..= columns - 1, 0 ..= rows - 1, (0, 0)).unwrap();
    luma
}

fn all_tiles(header: &Header) -> Vec<TileCoordinates> {
    header.geometry().tiles_in_level((0, 0)).unwrap().collect()
}


#[test]
fn level_geometry_of_a_small_image(){
    let window = IntegerBounds::from_min_max(Vec2(0, 0), Vec2(15, 5)).unwrap();
    let tiles = |level_mode| TileDescription { tile_size: Vec2(4, 4), level_mode, rounding_mode: RoundingMode::Down };

    let single = LevelGeometry::new(tiles(LevelMode::Singular), window);
    assert_eq!(single.num_x_tiles(0).unwrap(), 4);
    assert_eq!(single.num_y_tiles(0).unwrap(), 2);

    let last_tile = single.data_window_for_tile(TileCoordinates::new((3, 1), (0, 0))).unwrap();
    assert_eq!((last_tile.position, last_tile.max()), (Vec2(12, 4), Vec2(15, 5)));

    let mip = LevelGeometry::new(tiles(LevelMode::MipMap), window);
    assert_eq!(mip.num_levels().unwrap(), 5);
    assert_eq!(mip.level_width(4).unwrap(), 1);
    assert_eq!(mip.level_height(2).unwrap(), 1);

    let rip = LevelGeometry::new(tiles(LevelMode::RipMap), window);
    assert!(matches!(rip.num_levels(), Err(Error::InvalidLevelMode)));
    assert_eq!((rip.num_x_levels(), rip.num_y_levels()), (5, 3));
    assert!(matches!(rip.level_height(3), Err(Error::LevelOutOfRange(_))));
}

#[test]
fn single_and_multi_threaded_reads_are_identical(){
    let header = luma_header((67, 45), (16, 8), LevelMode::Singular).with_compression(Compression::ZIP16);
    let mut luma = random_luma(67 * 45);

    let mut bytes = Cursor::new(Vec::new());
    write_luma_tiles(&mut bytes, header.clone(), &mut luma, &all_tiles(&header)).finish().unwrap();
    let bytes = bytes.into_inner();

    let sequential = read_luma(bytes.clone(), 1);
    let parallel = read_luma(bytes, 8);

    assert_eq!(sequential, luma);
    assert_eq!(parallel, sequential);
}

#[test]
fn single_and_multi_threaded_writes_are_identical(){
    let header = luma_header((40, 40), (8, 8), LevelMode::Singular).with_compression(Compression::RLE);
    let mut luma = random_luma(40 * 40);

    let write = |threads: usize, luma: &mut [f32]| {
        let mut bytes = Cursor::new(Vec::new());
        let window = header.data_window;

        let options = WriteOptions::default().with_thread_count(threads);
        let mut output = TiledOutputFile::from_buffered(&mut bytes, header.clone(), options).unwrap();
        output.set_frame_buffer(luma_frame_buffer(luma, window)).unwrap();
        output.write_tiles(0 ..= 4, 0 ..= 4, (0, 0)).unwrap();
        output.finish().unwrap();

        bytes.into_inner()
    };

    // increasing line order forces the same chunk order regardless of the threads
    assert_eq!(write(1, &mut luma[..]), write(6, &mut luma[..]));
}

#[test]
fn decreasing_line_order(){
    let header = luma_header((20, 20), (8, 8), LevelMode::Singular).with_line_order(LineOrder::Decreasing);
    let mut luma = random_luma(20 * 20);

    let mut bytes = Cursor::new(Vec::new());
    write_luma_tiles(&mut bytes, header.clone(), &mut luma, &all_tiles(&header)).finish().unwrap();

    let bytes = bytes.into_inner();
    let input = TiledInputFile::from_buffered(Cursor::new(bytes.clone()), ReadOptions::default()).unwrap();
    assert_eq!(input.header().line_order, LineOrder::Decreasing);
    assert!(input.is_complete());

    // the last row of tiles is stored first, its y index follows the x index
    let first_chunk = chunks_start(&header);
    let first_chunk_tile_y = u32::from_le_bytes([
        bytes[first_chunk + 4], bytes[first_chunk + 5], bytes[first_chunk + 6], bytes[first_chunk + 7],
    ]);

    assert_eq!(first_chunk_tile_y, 2);
    assert_eq!(read_luma(bytes, 4), luma);
}

/// A file without any tiles consists of the meta data and the offset table.
fn chunks_start(header: &Header) -> usize {
    let mut bytes = Cursor::new(Vec::new());
    TiledOutputFile::from_buffered(&mut bytes, header.clone(), WriteOptions::default()).unwrap().finish().unwrap();
    bytes.into_inner().len()
}

#[test]
fn files_on_disk(){
    let path = std::env::temp_dir().join(format!("exr-tiles-test-{}.exr", std::process::id()));

    let header = luma_header((30, 17), (8, 8), LevelMode::MipMap).with_compression(Compression::ZIP1);
    let levels: Vec<Vec2<usize>> = header.geometry().levels().collect();
    let mut pyramid: Vec<Vec<f32>> = Vec::new();

    {
        let mut output = TiledOutputFile::create(&path, header.clone()).unwrap();
        assert_eq!(output.file_name(), Some(path.as_path()));
        assert!(!output.is_complete());

        for &level in &levels {
            let window = output.data_window_for_level(level).unwrap();
            pyramid.push(random_luma(window.size.area()));

            output.set_frame_buffer(luma_frame_buffer(pyramid.last_mut().unwrap(), window)).unwrap();
            let tiles: Vec<TileCoordinates> = output.geometry().tiles_in_level(level).unwrap().collect();
            output.write_tile_batch(&tiles).unwrap();
        }

        assert!(output.is_complete());
        output.finish().unwrap();
    }

    let mut input = TiledInputFile::open(&path).unwrap();
    assert_eq!(input.file_name(), Some(path.as_path()));
    assert_eq!(input.num_levels().unwrap(), levels.len());
    assert_eq!(input.version() & 0xff, 2);
    assert_eq!(input.version() & (1 << 9), 1 << 9);

    for (&level, expected) in levels.iter().zip(&pyramid) {
        let window = input.data_window_for_level(level).unwrap();
        let mut luma = vec![ 0.0; window.size.area() ];
        input.set_frame_buffer(luma_frame_buffer(&mut luma, window)).unwrap();

        let tiles: Vec<TileCoordinates> = input.geometry().tiles_in_level(level).unwrap().collect();
        for tile in tiles {
            input.read_mip_tile(tile.tile_index.x(), tile.tile_index.y(), level.x()).unwrap();
        }

        assert_eq!(&luma, expected);
    }

    drop(input);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn in_memory_files_have_no_name(){
    let header = luma_header((8, 8), (8, 8), LevelMode::Singular);
    let mut luma = random_luma(64);
    let mut bytes = Cursor::new(Vec::new());

    let output = write_luma_tiles(&mut bytes, header, &mut luma, &[ tile(0, 0) ]);
    assert_eq!(output.file_name(), None);
    output.finish().unwrap();

    let input = TiledInputFile::from_buffered(Cursor::new(bytes.into_inner()), ReadOptions::default()).unwrap();
    assert_eq!(input.file_name(), None);
}

#[test]
fn completeness_while_writing(){
    let header = luma_header((16, 16), (8, 8), LevelMode::MipMap);
    let mut luma = random_luma(16 * 16);
    let mut bytes = Cursor::new(Vec::new());

    let window = header.data_window;
    let mut output = TiledOutputFile::from_buffered(&mut bytes, header, WriteOptions::default()).unwrap();
    assert!(!output.is_complete());
    assert_eq!(output.missing_tiles().len(), 4 + 1 + 1 + 1 + 1);

    output.set_frame_buffer(luma_frame_buffer(&mut luma, window)).unwrap();
    output.write_tiles(0 ..= 1, 0 ..= 1, (0, 0)).unwrap();
    assert!(!output.is_complete());

    // smaller levels reuse the top left part of the full resolution buffer
    for level in 1 .. 5 {
        output.write_tile(TileCoordinates::new((0, 0), (level, level))).unwrap();
    }

    assert!(output.is_complete());
    assert!(output.missing_tiles().is_empty());
    output.finish().unwrap();

    let input = TiledInputFile::from_buffered(Cursor::new(bytes.into_inner()), ReadOptions::default()).unwrap();
    assert!(input.is_complete());
}

#[test]
fn tile_index_equal_to_tile_count_is_out_of_range(){
    let header = luma_header((16, 6), (4, 4), LevelMode::Singular);
    let mut luma = random_luma(16 * 6);
    let mut bytes = Cursor::new(Vec::new());

    let mut output = write_luma_tiles(&mut bytes, header, &mut luma, &[]);
    let columns = output.num_x_tiles(0).unwrap();

    assert!(output.is_valid_tile(tile(columns - 1, 0)));
    assert!(!output.is_valid_tile(tile(columns, 0)));
    assert!(matches!(output.write_tile(tile(columns, 0)), Err(Error::TileCoordinateOutOfRange(_))));
    assert!(matches!(output.write_tiles(0 ..= columns, 0 ..= 0, (0, 0)), Err(Error::TileCoordinateOutOfRange(_))));
    assert!(matches!(output.write_tile(TileCoordinates::new((0, 0), (1, 1))), Err(Error::TileCoordinateOutOfRange(_))));
    assert!(matches!(output.data_window_for_tile(tile(0, 2)), Err(Error::TileCoordinateOutOfRange(_))));
}

#[test]
fn repeated_tiles_in_a_read_batch(){
    let header = luma_header((16, 16), (4, 4), LevelMode::Singular);
    let tiles = all_tiles(&header);
    let mut luma = random_luma(16 * 16);

    let mut bytes = Cursor::new(Vec::new());
    write_luma_tiles(&mut bytes, header, &mut luma, &tiles).finish().unwrap();

    let options = ReadOptions::default().with_thread_count(8);
    let mut input = TiledInputFile::from_buffered(Cursor::new(bytes.into_inner()), options).unwrap();

    let window = input.header().data_window;
    let mut read_luma = vec![ 0.0; 16 * 16 ];
    input.set_frame_buffer(luma_frame_buffer(&mut read_luma, window)).unwrap();

    let repeated: Vec<TileCoordinates> = tiles.iter().chain(&tiles).chain(&tiles).copied().collect();
    input.read_tile_batch(&repeated).unwrap();
    input.read_tile_batch(&[ tile(2, 1), tile(2, 1) ]).unwrap();

    assert_eq!(read_luma, luma);
}

#[test]
fn tile_ranges_far_outside_the_level(){
    let header = luma_header((8, 8), (2, 2), LevelMode::Singular);
    let mut luma = random_luma(64);

    let mut bytes = Cursor::new(Vec::new());
    write_luma_tiles(&mut bytes, header.clone(), &mut luma, &all_tiles(&header)).finish().unwrap();

    let mut input = TiledInputFile::from_buffered(Cursor::new(bytes.into_inner()), ReadOptions::default()).unwrap();
    let mut read_luma = vec![ 0.0; 64 ];
    input.set_frame_buffer(luma_frame_buffer(&mut read_luma, header.data_window)).unwrap();

    match input.read_tiles(0 ..= 1, 0 ..= 300_000_000, (0, 0)) {
        Err(Error::TileCoordinateOutOfRange(outside)) => assert_eq!(outside, tile(0, 4)),
        other => panic!("expected an out of range tile, got {:?}", other),
    }

    assert!(matches!(input.read_tiles(0 ..= usize::MAX, 0 ..= 0, (0, 0)), Err(Error::TileCoordinateOutOfRange(_))));
}

#[test]
fn duplicate_tiles_are_rejected(){
    let header = luma_header((16, 16), (8, 8), LevelMode::Singular).with_line_order(LineOrder::Unspecified);
    let mut luma = random_luma(16 * 16);
    let mut bytes = Cursor::new(Vec::new());

    let mut output = write_luma_tiles(&mut bytes, header, &mut luma, &[ tile(1, 1), tile(0, 0) ]);
    assert!(matches!(output.write_tile(tile(1, 1)), Err(Error::DuplicateTile(_))));

    // the other tiles of the batch are still written
    let result = output.write_tile_batch(&[ tile(1, 0), tile(0, 0), tile(0, 1) ]);
    assert!(matches!(result, Err(Error::DuplicateTile(coordinates)) if coordinates == tile(0, 0)));
    assert!(output.is_complete());

    output.finish().unwrap();
    assert_eq!(read_luma(bytes.into_inner(), 2), luma);
}

#[test]
fn missing_channel_binding(){
    let header = luma_header((8, 8), (4, 4), LevelMode::Singular);
    let mut luma = random_luma(64);
    let window = header.data_window;

    let mut bytes = Cursor::new(Vec::new());
    let mut output = TiledOutputFile::from_buffered(&mut bytes, header, WriteOptions::default()).unwrap();

    let wrong_name = FrameBuffer::new().with_slice("y", unsafe {
        Slice::packed(SampleType::F32, luma.as_mut_ptr() as *mut u8, window, 0.0)
    });

    assert!(matches!(output.set_frame_buffer(wrong_name), Err(Error::MissingChannelBinding(name)) if name == Text::from("Y")));
    assert!(matches!(output.write_tile(tile(0, 0)), Err(Error::MissingChannelBinding(_))));

    output.set_frame_buffer(luma_frame_buffer(&mut luma, window)).unwrap();
    output.write_tiles(0 ..= 1, 0 ..= 1, (0, 0)).unwrap();
    output.finish().unwrap();

    let mut input = TiledInputFile::from_buffered(Cursor::new(bytes.into_inner()), ReadOptions::default()).unwrap();
    assert!(matches!(input.read_tile(tile(0, 0)), Err(Error::MissingChannelBinding(_))));
    assert!(matches!(input.set_frame_buffer(FrameBuffer::new()), Err(Error::MissingChannelBinding(_))));
}

#[test]
fn absent_channels_are_filled(){
    let header = luma_header((8, 4), (4, 4), LevelMode::Singular);
    let window = header.data_window;
    let mut luma = random_luma(32);

    let mut bytes = Cursor::new(Vec::new());
    write_luma_tiles(&mut bytes, header, &mut luma, &[ tile(0, 0), tile(1, 0) ]).finish().unwrap();

    let mut input = TiledInputFile::from_buffered(Cursor::new(bytes.into_inner()), ReadOptions::default()).unwrap();

    let mut read_luma = vec![ 0.0_f32; 32 ];
    let mut alpha = vec![ 0_u32; 32 ];

    let frame_buffer = luma_frame_buffer(&mut read_luma, window).with_slice("A", unsafe {
        Slice::packed(SampleType::U32, alpha.as_mut_ptr() as *mut u8, window, 7.0)
    });

    input.set_frame_buffer(frame_buffer).unwrap();
    input.read_tile(tile(1, 0)).unwrap();

    // only the right half of the image has been read
    for y in 0 .. 4 {
        assert_eq!(&alpha[y * 8 .. y * 8 + 4], &[ 0; 4 ]);
        assert_eq!(&alpha[y * 8 + 4 .. y * 8 + 8], &[ 7; 4 ]);
        assert_eq!(&read_luma[y * 8 + 4 .. y * 8 + 8], &luma[y * 8 + 4 .. y * 8 + 8]);
    }
}

#[test]
fn reading_unwritten_tiles(){
    let header = luma_header((16, 8), (8, 8), LevelMode::Singular);
    let mut luma = random_luma(16 * 8);
    let window = header.data_window;

    let mut bytes = Cursor::new(Vec::new());
    write_luma_tiles(&mut bytes, header, &mut luma, &[ tile(1, 0) ]).finish().unwrap();

    let mut input = TiledInputFile::from_buffered(Cursor::new(bytes.into_inner()), ReadOptions::default()).unwrap();
    assert!(!input.is_complete());
    assert_eq!(input.missing_tiles(), vec![ tile(0, 0) ]);

    let mut read_luma = vec![ 0.0; 16 * 8 ];
    input.set_frame_buffer(luma_frame_buffer(&mut read_luma, window)).unwrap();

    match input.read_tiles(0 ..= 1, 0 ..= 0, (0, 0)) {
        Err(Error::Io(error)) => assert_eq!(error.kind(), ErrorKind::UnexpectedEof),
        other => panic!("expected unwritten tile error, got {:?}", other),
    }

    // the handle remains usable, and the successful tile has been read
    input.read_tile(tile(1, 0)).unwrap();
    assert_eq!(read_luma[8 .. 16], luma[8 .. 16]);
    assert!(matches!(input.read_tile(tile(2, 0)), Err(Error::TileCoordinateOutOfRange(_))));
}

#[test]
fn unfinished_file_is_reconstructed(){
    let header = luma_header((24, 16), (8, 8), LevelMode::Singular).with_compression(Compression::RLE);
    let mut luma = random_luma(24 * 16);
    let mut bytes = Cursor::new(Vec::new());

    let written = [ tile(0, 0), tile(1, 0), tile(2, 0), tile(0, 1) ];
    let output = write_luma_tiles(&mut bytes, header, &mut luma, &written);

    // simulate a crash, where the offset table is never written
    std::mem::forget(output);

    let bytes = bytes.into_inner();
    let mut input = TiledInputFile::from_buffered(Cursor::new(bytes), ReadOptions::default()).unwrap();
    assert!(!input.is_complete());
    assert_eq!(input.missing_tiles(), vec![ tile(1, 1), tile(2, 1) ]);

    let window = input.header().data_window;
    let mut read_luma = vec![ 0.0; 24 * 16 ];
    input.set_frame_buffer(luma_frame_buffer(&mut read_luma, window)).unwrap();
    input.read_tile_batch(&written).unwrap();

    assert_eq!(read_luma[.. 24 * 8], luma[.. 24 * 8]);
}

#[test]
fn truncated_file_is_reconstructed(){
    let header = luma_header((32, 8), (8, 8), LevelMode::Singular);
    let mut luma = random_luma(32 * 8);
    let mut bytes = Cursor::new(Vec::new());

    let tiles = all_tiles(&header);
    write_luma_tiles(&mut bytes, header, &mut luma, &tiles).finish().unwrap();

    // remove the last chunk, so that its offset points behind the end of the file
    let mut bytes = bytes.into_inner();
    let chunk_size = 4 * 5 + 8 * 8 * 2;
    bytes.truncate(bytes.len() - chunk_size);

    let mut input = TiledInputFile::from_buffered(Cursor::new(bytes), ReadOptions::default()).unwrap();
    assert_eq!(input.missing_tiles(), vec![ tile(3, 0) ]);

    let window = input.header().data_window;
    let mut read_luma = vec![ 0.0; 32 * 8 ];
    input.set_frame_buffer(luma_frame_buffer(&mut read_luma, window)).unwrap();
    input.read_tiles(0 ..= 2, 0 ..= 0, (0, 0)).unwrap();

    for y in 0 .. 8 {
        assert_eq!(read_luma[y * 32 .. y * 32 + 24], luma[y * 32 .. y * 32 + 24]);
    }
}

#[test]
fn copy_raw_tiles(){
    let header = luma_header((20, 12), (8, 8), LevelMode::RipMap).with_compression(Compression::ZIP16);
    let mut luma = random_luma(20 * 12);
    let mut source = Cursor::new(Vec::new());

    {
        let window = header.data_window;
        let mut output = TiledOutputFile::from_buffered(&mut source, header.clone(), WriteOptions::default()).unwrap();
        let levels: Vec<Vec2<usize>> = output.geometry().levels().collect();

        for level in levels {
            // every level is read from the top left corner of the full resolution level
            output.set_frame_buffer(luma_frame_buffer(&mut luma, window)).unwrap();
            let tiles: Vec<TileCoordinates> = output.geometry().tiles_in_level(level).unwrap().collect();
            output.write_tile_batch(&tiles).unwrap();
        }

        output.finish().unwrap();
    }

    let source = source.into_inner();
    let input = TiledInputFile::from_buffered(Cursor::new(source.clone()), ReadOptions::default()).unwrap();

    let mut copy = Cursor::new(Vec::new());
    {
        let mut output = TiledOutputFile::from_buffered(&mut copy, header.clone(), WriteOptions::default()).unwrap();
        output.copy_tiles_from(&input).unwrap();
        assert!(output.is_complete());

        assert!(matches!(output.copy_tiles_from(&input), Err(Error::Invalid(_))));
        output.finish().unwrap();
    }

    assert_eq!(copy.into_inner(), source);

    let mut other_layout = Cursor::new(Vec::new());
    let mut output = TiledOutputFile::from_buffered(
        &mut other_layout, header.with_compression(Compression::RLE), WriteOptions::default()
    ).unwrap();

    assert!(matches!(output.copy_tiles_from(&input), Err(Error::Invalid(_))));

    let first = TileCoordinates::new((0, 0), (1, 0));
    let raw = input.raw_tile_data(first).unwrap();
    assert!(!raw.is_empty());
    assert!(raw.len() <= 8 * 8 * 2);
}

#[test]
fn non_tiled_files_are_rejected(){
    let mut bytes = vec![ 0x76, 0x2f, 0x31, 0x01, 2, 0, 0, 0 ];
    bytes.extend_from_slice(&[ 0; 32 ]);

    let result = TiledInputFile::from_buffered(Cursor::new(bytes), ReadOptions::default());
    assert!(matches!(result, Err(Error::Invalid(_))));

    let result = TiledInputFile::from_buffered(Cursor::new(b"not an exr file".to_vec()), ReadOptions::default());
    assert!(matches!(result, Err(Error::Invalid(_))));
}
