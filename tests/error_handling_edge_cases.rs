//! Error conditions, edge cases and boundary conditions of the compositing
//! pipeline

use image::{Rgba, RgbaImage};
use imgly_bgcompose::{
    config::{BlurEffect, BorderEffect, Color, EffectConfig, PipelineConfig},
    error::{CompositeError, Result},
    services::{ImageIOService, MAX_UPLOAD_BYTES},
    CompositePipeline,
};

fn opaque(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
}

#[test]
fn test_mismatched_inputs_are_rejected() {
    let mut pipeline = CompositePipeline::new(PipelineConfig::default()).unwrap();

    let err = pipeline
        .render(&opaque(10, 10), &opaque(10, 11), &EffectConfig::default())
        .unwrap_err();

    assert!(matches!(err, CompositeError::InputMismatch(_)));
    assert!(pipeline.current_artifact().is_none());
}

#[test]
fn test_allocation_limit_is_enforced() -> Result<()> {
    let config = PipelineConfig::builder().max_megapixels(0.001).build()?;
    let mut pipeline = CompositePipeline::new(config)?;

    let err = pipeline
        .render(&opaque(100, 100), &opaque(100, 100), &EffectConfig::default())
        .unwrap_err();
    assert!(matches!(err, CompositeError::Allocation(_)));

    // within the limit the same pipeline still works
    let artifact = pipeline.render(&opaque(20, 20), &opaque(20, 20), &EffectConfig::default())?;
    assert_eq!(artifact.dimensions(), (20, 20));
    Ok(())
}

#[test]
fn test_pool_exhaustion_keeps_previous_artifact() -> Result<()> {
    let config = PipelineConfig::builder().pool_capacity(1).build()?;
    let mut pipeline = CompositePipeline::new(config)?;
    let original = opaque(30, 30);
    let foreground = RgbaImage::new(30, 30);

    let first = pipeline.render(&original, &foreground, &EffectConfig::default())?;

    // blur needs a second surface next to the canvas
    let blurred = EffectConfig::default().with_blur(BlurEffect {
        enabled: true,
        radius_px: 3,
    });
    let err = pipeline.render(&original, &foreground, &blurred).unwrap_err();
    assert!(matches!(err, CompositeError::SurfaceUnavailable(_)));

    assert_eq!(pipeline.current_artifact(), Some(first.handle()));
    assert!(pipeline.artifacts().is_live(first.handle()));
    assert_eq!(pipeline.pool().outstanding(), 0);

    let second = pipeline.render(&original, &foreground, &EffectConfig::default())?;
    assert_ne!(second.handle(), first.handle());
    Ok(())
}

#[test]
fn test_out_of_range_effects_are_rejected() {
    let mut pipeline = CompositePipeline::new(PipelineConfig::default()).unwrap();
    let image = opaque(8, 8);

    let wide_border = EffectConfig::default().with_border(BorderEffect {
        enabled: true,
        color: Color::BLACK,
        size_px: 10_000,
    });
    let err = pipeline.render(&image, &image, &wide_border).unwrap_err();
    assert!(matches!(err, CompositeError::InvalidConfig(_)));

    assert!(EffectConfig::from_json(r#"{"blur":{"enabled":true,"radius_px":1000}}"#).is_err());
    assert!(EffectConfig::from_json("not json").is_err());
}

#[test]
fn test_invalid_pipeline_config() {
    assert!(PipelineConfig::builder().pool_capacity(0).build().is_err());
    assert!(PipelineConfig::builder().max_megapixels(-1.0).build().is_err());
    assert!(PipelineConfig::builder().max_megapixels(f64::NAN).build().is_err());
}

#[test]
fn test_one_pixel_images() -> Result<()> {
    let mut pipeline = CompositePipeline::new(PipelineConfig::default())?;
    let original = opaque(1, 1);
    let foreground = RgbaImage::from_pixel(1, 1, Rgba([200, 0, 0, 255]));
    let effects = EffectConfig::builder()
        .original_background()
        .blur(5)
        .grayscale(true)
        .border(Color::WHITE, 40)
        .build()?;

    let image = pipeline.render_image(&original, &foreground, &effects)?;
    assert_eq!(*image.get_pixel(0, 0), Rgba([200, 0, 0, 255]));
    Ok(())
}

#[test]
fn test_fully_transparent_foreground_with_border() -> Result<()> {
    let mut pipeline = CompositePipeline::new(PipelineConfig::default())?;
    let effects = EffectConfig::builder()
        .background_color(Color::BLACK)
        .border(Color::WHITE, 40)
        .build()?;

    let image = pipeline.render_image(&opaque(12, 12), &RgbaImage::new(12, 12), &effects)?;

    // nothing to outline
    assert!(image.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
    Ok(())
}

#[test]
fn test_border_at_image_edge_is_clipped() -> Result<()> {
    let mut pipeline = CompositePipeline::new(PipelineConfig::default())?;
    let mut foreground = RgbaImage::new(10, 10);
    foreground.put_pixel(0, 0, Rgba([0, 0, 255, 255]));
    let effects = EffectConfig::builder()
        .background_color(Color::BLACK)
        .border(Color::rgb(255, 0, 0), 24)
        .build()?;

    let image = pipeline.render_image(&opaque(10, 10), &foreground, &effects)?;

    assert_eq!(image.dimensions(), (10, 10));
    assert_eq!(*image.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
    assert_eq!(*image.get_pixel(3, 0), Rgba([255, 0, 0, 255]));
    assert_eq!(*image.get_pixel(4, 0), Rgba([0, 0, 0, 255]));
    assert_eq!(*image.get_pixel(2, 2), Rgba([255, 0, 0, 255]));
    Ok(())
}

#[test]
fn test_upload_validation() {
    let png = imgly_bgcompose::export::encode_png(&opaque(2, 2)).unwrap();
    assert!(ImageIOService::ingest(Some("ok.png"), png.clone()).is_ok());

    let mut oversized = png;
    oversized.resize(MAX_UPLOAD_BYTES + 1, 0);
    assert!(matches!(
        ImageIOService::ingest(Some("big.png"), oversized),
        Err(CompositeError::InputTooLarge(_))
    ));

    assert!(matches!(
        ImageIOService::ingest(None, Vec::new()),
        Err(CompositeError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_release_of_unknown_artifact() -> Result<()> {
    let mut pipeline = CompositePipeline::new(PipelineConfig::default())?;
    let artifact = pipeline.render(&opaque(4, 4), &opaque(4, 4), &EffectConfig::default())?;

    assert!(pipeline.release_artifact(artifact.handle()));
    assert!(!pipeline.release_artifact(artifact.handle()));
    assert!(pipeline.current_artifact().is_none());
    // the caller's copy of the bytes stays valid
    assert_eq!(artifact.decode()?.dimensions(), (4, 4));
    Ok(())
}

#[test]
fn test_retryable_classification() {
    assert!(CompositeError::surface_unavailable("busy").is_retryable());
    assert!(!CompositeError::input_mismatch("size").is_retryable());
}
