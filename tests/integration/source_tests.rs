//! TIFF source integration tests.
//!
//! Tests verify:
//! - Pyramid levels are identified and labels ignored
//! - Region reads across tile boundaries return the exact pixels
//! - Both byte orders decode identically
//! - JPEG tiles decode to RGB whatever the photometric tag says
//! - Aperio properties are parsed from the first IFD
//! - Unsupported pixel layouts and bad requests are reported

use wsi_tiler::slide::SlideFormat;
use wsi_tiler::{ImageSource, SourceError, SourceHandle, TiffSlideSource};

use super::test_utils::{
    coordinate_pattern, jpeg_slide, three_band_slide, two_level_slide, write_slide,
    ByteOrderType, TiffBuilder, TiledImage, PHOTOMETRIC_RGB, PHOTOMETRIC_YCBCR, RED, TISSUE,
    WHITE,
};

fn pattern_slide(order: ByteOrderType) -> TiffBuilder {
    TiffBuilder::new()
        .with_byte_order(order)
        .add_image(TiledImage::new(1100, 700, coordinate_pattern).with_tile_size(128, 96))
}

fn assert_matches_pattern(bytes: &[u8], x0: u32, y0: u32, width: u32, height: u32) {
    for dy in 0..height {
        for dx in 0..width {
            let offset = ((dy * width + dx) * 3) as usize;
            assert_eq!(
                &bytes[offset..offset + 3],
                &coordinate_pattern(x0 + dx, y0 + dy),
                "pixel mismatch at ({}, {})",
                x0 + dx,
                y0 + dy
            );
        }
    }
}

// =============================================================================
// Level Identification
// =============================================================================

#[test]
fn test_label_image_is_not_a_level() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "slide.svs", &three_band_slide());

    let handle = TiffSlideSource::new().open(&path).unwrap();
    assert_eq!(handle.level_count(), 1);

    let dims = handle.dimensions();
    assert_eq!((dims.width, dims.height, dims.channels), (2000, 1600, 3));

    let info = handle.level_info(0).unwrap();
    assert_eq!((info.chunk_width, info.chunk_height), (256, 256));
    assert!(handle.level_info(1).is_none());
}

#[test]
fn test_two_levels() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "pyramid.tif", &two_level_slide());

    let mut handle = TiffSlideSource::new().open(&path).unwrap();
    assert_eq!(handle.level_count(), 2);
    assert_eq!(handle.level_info(1).unwrap().downsample, 2.0);

    handle.select_level(1).unwrap();
    assert_eq!(handle.current_level(), 1);
    assert_eq!(handle.dimensions().width, 1200);

    let tile = handle.read_region(1100, 400, 100, 100).unwrap();
    assert_eq!(&tile.as_bytes()[..3], &TISSUE);
}

#[test]
fn test_invalid_level() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "pyramid.tif", &two_level_slide());

    let mut handle = TiffSlideSource::new().open(&path).unwrap();
    let err = handle.select_level(13).unwrap_err();
    assert!(matches!(err, SourceError::InvalidLevel { level: 13, count: 2 }));
    assert_eq!(handle.current_level(), 0);
}

// =============================================================================
// Region Reads
// =============================================================================

#[test]
fn test_region_spanning_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "pattern.tif", &pattern_slide(ByteOrderType::LittleEndian));

    let mut handle = TiffSlideSource::new().open(&path).unwrap();
    // Crosses 3 tile columns and 3 tile rows
    let tile = handle.read_region(120, 90, 200, 110).unwrap();
    assert_eq!((tile.width(), tile.height()), (200, 110));
    assert_matches_pattern(tile.as_bytes(), 120, 90, 200, 110);
}

#[test]
fn test_region_at_padded_edge() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "pattern.tif", &pattern_slide(ByteOrderType::LittleEndian));

    let mut handle = TiffSlideSource::new().open(&path).unwrap();
    // Last tile column and row are partial (1100 % 128, 700 % 96)
    let tile = handle.read_region(1000, 650, 100, 50).unwrap();
    assert_matches_pattern(tile.as_bytes(), 1000, 650, 100, 50);
}

#[test]
fn test_big_endian_matches_little_endian() {
    let dir = tempfile::tempdir().unwrap();
    let le = write_slide(dir.path(), "le.tif", &pattern_slide(ByteOrderType::LittleEndian));
    let be = write_slide(dir.path(), "be.tif", &pattern_slide(ByteOrderType::BigEndian));

    let source = TiffSlideSource::new();
    let a = source.open(&le).unwrap().read_region(300, 200, 64, 64).unwrap();
    let b = source.open(&be).unwrap().read_region(300, 200, 64, 64).unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());
}

#[test]
fn test_repeated_reads_with_tiny_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "pattern.tif", &pattern_slide(ByteOrderType::LittleEndian));

    let mut handle = TiffSlideSource::with_chunk_cache(1).open(&path).unwrap();
    for _ in 0..3 {
        let tile = handle.read_region(500, 300, 300, 200).unwrap();
        assert_matches_pattern(tile.as_bytes(), 500, 300, 300, 200);
    }
}

#[test]
fn test_out_of_bounds_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "pattern.tif", &pattern_slide(ByteOrderType::LittleEndian));

    let mut handle = TiffSlideSource::new().open(&path).unwrap();
    let err = handle.read_region(1050, 0, 100, 10).unwrap_err();
    assert!(matches!(err, SourceError::ReadFailed { .. }));
}

// =============================================================================
// JPEG Tiles
// =============================================================================

/// Within JPEG round-trip tolerance of `want`.
fn assert_close(got: &[u8], want: [u8; 3]) {
    for (g, w) in got.iter().zip(want) {
        assert!(
            (*g as i16 - w as i16).abs() <= 8,
            "got {:?}, expected about {:?}",
            got,
            want
        );
    }
}

fn check_jpeg_slide(photometric: u16, shared_tables: bool) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "jpeg.svs", &jpeg_slide(photometric, shared_tables));

    let mut handle = TiffSlideSource::new().open(&path).unwrap();
    assert_eq!(handle.dimensions().channels, 3);

    // Spans the first two tile columns, well inside the red band
    let tile = handle.read_region(200, 100, 200, 100).unwrap();
    let bytes = tile.as_bytes();
    assert_close(&bytes[..3], RED);
    assert_close(&bytes[bytes.len() - 3..], RED);

    let tile = handle.read_region(900, 300, 64, 64).unwrap();
    assert_close(&tile.as_bytes()[..3], WHITE);
}

#[test]
fn test_jpeg_ycbcr_tiles_are_rgb() {
    check_jpeg_slide(PHOTOMETRIC_YCBCR, false);
}

#[test]
fn test_jpeg_tiles_tagged_rgb_are_rgb() {
    check_jpeg_slide(PHOTOMETRIC_RGB, false);
}

#[test]
fn test_jpeg_tiles_with_shared_tables() {
    check_jpeg_slide(PHOTOMETRIC_YCBCR, true);
    check_jpeg_slide(PHOTOMETRIC_RGB, true);
}

#[test]
fn test_jpeg_edge_tiles_are_clipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "jpeg.svs", &jpeg_slide(PHOTOMETRIC_YCBCR, true));

    let mut handle = TiffSlideSource::with_chunk_cache(1).open(&path).unwrap();
    // Last column and row are padded tiles (1200 % 256, 600 % 256)
    let tile = handle.read_region(1100, 500, 100, 100).unwrap();
    assert_eq!((tile.width(), tile.height()), (100, 100));
    assert_close(&tile.as_bytes()[..3], WHITE);
}

// =============================================================================
// Properties and Unsupported Layouts
// =============================================================================

#[test]
fn test_aperio_properties() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "slide.svs", &three_band_slide());

    let handle = TiffSlideSource::new().open(&path).unwrap();
    let props = handle.properties().unwrap();
    assert_eq!(props.format, SlideFormat::AperioSvs);
    assert_eq!(props.magnification, Some(40.0));
    assert_eq!(props.mpp, Some(0.252));
}

#[test]
fn test_generic_tiff_properties() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "pyramid.tif", &two_level_slide());

    let handle = TiffSlideSource::new().open(&path).unwrap();
    let props = handle.properties().unwrap();
    assert_eq!(props.format, SlideFormat::GenericTiff);
    assert!(props.mpp.is_none());
}

#[test]
fn test_sixteen_bit_level_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let builder = TiffBuilder::new()
        .add_image(TiledImage::new(1200, 600, |_, _| TISSUE).with_bits_per_sample(16));
    let path = write_slide(dir.path(), "deep.tif", &builder);

    let mut handle = TiffSlideSource::new().open(&path).unwrap();
    assert_eq!(handle.level_info(0).unwrap().channels, None);

    let err = handle.select_level(0).unwrap_err();
    assert!(matches!(err, SourceError::Unsupported(_)));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = TiffSlideSource::new()
        .open(&dir.path().join("absent.svs"))
        .unwrap_err();
    assert!(matches!(err, SourceError::CannotOpen { .. }));
}
