//! End-to-end compositing workflows
//!
//! Renders synthetic originals and foregrounds through the full pipeline and
//! checks the resulting pixels.

use image::{Rgba, RgbaImage};
use imgly_bgcompose::{
    config::{BackgroundEffect, Color, EffectConfig, PipelineConfig},
    error::Result,
    export::decode_png,
    CompositePipeline,
};

const LIGHT: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
const DARK: Rgba<u8> = Rgba([0xf5, 0xf7, 0xfa, 0xff]);
const SUBJECT: Rgba<u8> = Rgba([220, 30, 30, 255]);

/// Checkerboard colour expected at a pixel with the default 32 px tiles
fn checker_at(x: u32, y: u32) -> Rgba<u8> {
    if (x / 32 + y / 32) % 2 == 0 {
        LIGHT
    } else {
        DARK
    }
}

/// Opaque disk of `radius` around `(cx, cy)`, transparent elsewhere
fn circle_foreground(width: u32, height: u32, cx: i64, cy: i64, radius: i64) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let dx = i64::from(x) - cx;
        let dy = i64::from(y) - cy;
        if dx * dx + dy * dy <= radius * radius {
            SUBJECT
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

fn gradient_original(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    })
}

fn pipeline() -> CompositePipeline {
    CompositePipeline::new(PipelineConfig::default()).unwrap()
}

#[test]
fn test_no_effects_shows_checkerboard_behind_subject() -> Result<()> {
    let original = gradient_original(96, 80);
    // left half opaque, right half transparent
    let foreground = RgbaImage::from_fn(96, 80, |x, _| {
        if x < 48 {
            SUBJECT
        } else {
            Rgba([0, 0, 0, 0])
        }
    });

    let image = pipeline().render_image(&original, &foreground, &EffectConfig::default())?;

    for (x, y, pixel) in image.enumerate_pixels() {
        let expected = if x < 48 { SUBJECT } else { checker_at(x, y) };
        assert_eq!(*pixel, expected, "pixel ({}, {})", x, y);
    }
    Ok(())
}

#[test]
fn test_opaque_foreground_on_black_fill() -> Result<()> {
    let original = gradient_original(100, 100);
    let foreground = RgbaImage::from_fn(100, 100, |x, y| {
        Rgba([(x * 2) as u8, (y * 2) as u8, 77, 255])
    });
    let effects = EffectConfig::builder()
        .background_color(Color::BLACK)
        .build()?;

    let artifact = pipeline().render(&original, &foreground, &effects)?;

    assert_eq!(artifact.dimensions(), (100, 100));
    assert_eq!(decode_png(artifact.bytes())?, foreground);
    Ok(())
}

#[test]
fn test_border_ring_around_circle() -> Result<()> {
    let original = gradient_original(200, 200);
    let foreground = circle_foreground(200, 200, 100, 100, 30);
    let green = Color::rgb(0, 200, 0);
    let effects = EffectConfig::builder().border(green, 40).build()?;
    assert_eq!(effects.border.thickness(), 5);

    let image = pipeline().render_image(&original, &foreground, &effects)?;

    // subject untouched
    assert_eq!(*image.get_pixel(100, 100), SUBJECT);
    assert_eq!(*image.get_pixel(130, 100), SUBJECT);
    // ring of the thickness just outside the subject
    for x in 131..=135 {
        assert_eq!(*image.get_pixel(x, 100), green.to_rgba(), "x = {}", x);
    }
    assert_eq!(*image.get_pixel(100, 65), green.to_rgba());
    assert_eq!(*image.get_pixel(65, 100), green.to_rgba());
    // checkerboard beyond the ring
    assert_eq!(*image.get_pixel(137, 100), checker_at(137, 100));
    assert_eq!(*image.get_pixel(0, 0), checker_at(0, 0));
    Ok(())
}

#[test]
fn test_original_background_wins_over_color() -> Result<()> {
    let original = gradient_original(64, 64);
    let foreground = circle_foreground(64, 64, 32, 32, 10);

    let background = BackgroundEffect::from_toggles(true, true, Color::BLACK);
    assert_eq!(background, BackgroundEffect::Original);
    let effects = EffectConfig::default().with_background(background);

    let image = pipeline().render_image(&original, &foreground, &effects)?;

    assert_eq!(image.get_pixel(0, 0), original.get_pixel(0, 0));
    assert_eq!(image.get_pixel(63, 5), original.get_pixel(63, 5));
    assert_eq!(*image.get_pixel(32, 32), SUBJECT);
    Ok(())
}

#[test]
fn test_disabled_background_ignores_color() -> Result<()> {
    let original = gradient_original(40, 40);
    let foreground = RgbaImage::new(40, 40);

    let background = BackgroundEffect::from_toggles(false, true, Color::BLACK);
    let effects = EffectConfig::default().with_background(background);
    let image = pipeline().render_image(&original, &foreground, &effects)?;

    assert_eq!(*image.get_pixel(0, 0), LIGHT);
    assert_eq!(*image.get_pixel(33, 0), DARK);
    Ok(())
}

#[test]
fn test_grayscale_leaves_subject_in_color() -> Result<()> {
    let original = RgbaImage::from_pixel(50, 50, Rgba([30, 90, 180, 255]));
    let foreground = circle_foreground(50, 50, 25, 25, 8);
    let effects = EffectConfig::builder()
        .original_background()
        .grayscale(true)
        .build()?;

    let image = pipeline().render_image(&original, &foreground, &effects)?;

    // (30 + 90 + 180 + 1) / 3 = 100
    assert_eq!(*image.get_pixel(2, 2), Rgba([100, 100, 100, 255]));
    assert_eq!(*image.get_pixel(25, 25), SUBJECT);
    Ok(())
}

#[test]
fn test_blur_keeps_subject_sharp() -> Result<()> {
    let original = RgbaImage::from_fn(80, 80, |x, _| {
        if x % 2 == 0 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let foreground = circle_foreground(80, 80, 40, 40, 12);
    let effects = EffectConfig::builder()
        .original_background()
        .blur(6)
        .build()?;

    let image = pipeline().render_image(&original, &foreground, &effects)?;

    assert_eq!(*image.get_pixel(40, 40), SUBJECT);
    // alternating stripes average towards mid grey once blurred
    let corner = image.get_pixel(5, 5);
    assert!(corner[0] > 60 && corner[0] < 200, "corner = {:?}", corner);
    Ok(())
}

#[test]
fn test_every_effect_together() -> Result<()> {
    let original = gradient_original(120, 120);
    let foreground = circle_foreground(120, 120, 60, 60, 20);
    let effects = EffectConfig::builder()
        .original_background()
        .blur(4)
        .grayscale(true)
        .border(Color::rgb(255, 255, 0), 32)
        .build()?;
    assert_eq!(
        effects.enabled_effects(),
        vec!["background-original", "blur", "grayscale", "border"]
    );

    let mut pipeline = pipeline();
    let artifact = pipeline.render_named(&original, &foreground, &effects, Some("beach.jpg"))?;
    let image = artifact.decode()?;

    assert_eq!(artifact.file_name(), "beach_removebg.png");
    assert_eq!(*image.get_pixel(60, 60), SUBJECT);
    // thickness 4: the ring covers x = 81..=84 on the centre row
    assert_eq!(*image.get_pixel(82, 60), Rgba([255, 255, 0, 255]));
    let background = image.get_pixel(5, 5);
    assert_eq!(background[0], background[1]);
    assert_eq!(background[1], background[2]);
    Ok(())
}

#[test]
fn test_png_round_trip_is_lossless() -> Result<()> {
    let original = gradient_original(33, 17);
    let foreground = RgbaImage::from_fn(33, 17, |x, y| {
        Rgba([(x * 7) as u8, (y * 13) as u8, 5, if (x + y) % 3 == 0 { 0 } else { 255 }])
    });
    let effects = EffectConfig::builder().original_background().build()?;

    let mut pipeline = pipeline();
    let rendered = pipeline.render_image(&original, &foreground, &effects)?;
    let artifact = pipeline.render(&original, &foreground, &effects)?;

    assert_eq!(decode_png(artifact.bytes())?, rendered);
    Ok(())
}

#[test]
fn test_metadata_describes_render() -> Result<()> {
    let original = gradient_original(16, 16);
    let foreground = RgbaImage::new(16, 16);
    let effects = EffectConfig::default().with_grayscale(true);

    let artifact = pipeline().render(&original, &foreground, &effects)?;
    let metadata = artifact.metadata();

    assert_eq!((metadata.width, metadata.height), (16, 16));
    assert_eq!(metadata.effects, vec!["grayscale".to_string()]);
    assert!(metadata.timings.encode_ms.is_some());
    Ok(())
}

#[test]
fn test_save_writes_png_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let original = gradient_original(20, 10);
    let foreground = circle_foreground(20, 10, 10, 5, 3);

    let mut pipeline = pipeline();
    let artifact = pipeline.render_named(
        &original,
        &foreground,
        &EffectConfig::default(),
        Some("dog.webp"),
    )?;
    let path = artifact.save_to_dir(dir.path())?;

    assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("dog_removebg.png"));
    let reread = image::open(&path)?.to_rgba8();
    assert_eq!(reread, artifact.decode()?);
    Ok(())
}
