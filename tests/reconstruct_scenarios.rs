use std::sync::Arc;

use drawing_translator::reconstruct::{
    Alignment, Fitting, PixelRegion, SampleOutcome, denormalize, erase, plan_layout,
};
use drawing_translator::surface::{Rgb, load_font_database, resolve_fonts};
use drawing_translator::{
    AnnotatedRegion, Category, PixmapSurface, ReconstructionConfig, Surface, TextStyle,
    reconstruct,
};
use image::{Rgba, RgbaImage};
use usvg::fontdb;

fn surface_from(image: &RgbaImage) -> PixmapSurface {
    // no fonts: text measurement uses estimated widths and drawing paints nothing
    PixmapSurface::from_rgba(image, TextStyle::default(), Arc::new(fontdb::Database::new()))
        .expect("surface")
}

fn region(original: &str, translated: &str, bbox: [f32; 4], category: Category) -> AnnotatedRegion {
    AnnotatedRegion {
        original_text: original.to_string(),
        translated_text: translated.to_string(),
        bbox: bbox.into(),
        category,
    }
}

fn ink(image: &mut RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32) {
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, Rgba([15, 15, 15, 255]));
        }
    }
}

#[test]
fn unchanged_text_leaves_the_image_identical() {
    let mut image = RgbaImage::from_pixel(1000, 1000, Rgba([245, 245, 245, 255]));
    ink(&mut image, 110, 110, 390, 190);
    let mut surface = surface_from(&image);
    let regions = vec![region("200 mm", "200 mm", [100.0, 100.0, 200.0, 400.0], Category::Text)];
    let report = reconstruct(&mut surface, &regions, &ReconstructionConfig::default())
        .expect("reconstruct");
    assert_eq!(report.processed, 0);
    assert_eq!(surface.to_rgba_image().expect("export"), image);
}

#[test]
fn technical_regions_are_preserved_next_to_translated_ones() {
    let mut image = RgbaImage::from_pixel(400, 400, Rgba([235, 235, 235, 255]));
    ink(&mut image, 40, 40, 160, 60);
    ink(&mut image, 240, 240, 360, 260);
    let mut surface = surface_from(&image);
    let regions = vec![
        region("General note", "一般说明", [90.0, 90.0, 160.0, 410.0], Category::Text),
        region("Ø20 ±0.05", "Ø20 ±0.05 (tr)", [590.0, 590.0, 660.0, 910.0], Category::Technical),
    ];
    let report = reconstruct(&mut surface, &regions, &ReconstructionConfig::default())
        .expect("reconstruct");
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 1);

    let result = surface.to_rgba_image().expect("export");
    for y in 236..264 {
        for x in 236..364 {
            assert_eq!(result.get_pixel(x, y), image.get_pixel(x, y));
        }
    }
    // ink of the translated region is gone, replaced by the sampled background
    for y in 40..60 {
        for x in 40..160 {
            assert_eq!(result.get_pixel(x, y).0, [235, 235, 235, 255]);
        }
    }
}

#[test]
fn full_width_banner_is_filled_light_and_centered() {
    let mut image = RgbaImage::from_pixel(1000, 200, Rgba([240, 240, 240, 255]));
    ink(&mut image, 100, 5, 600, 15);
    let mut surface = surface_from(&image);
    let config = ReconstructionConfig::default();
    let banner = region("Material: Steel", "材质：钢", [0.0, 0.0, 100.0, 1000.0], Category::Text);

    let pixel_region = denormalize(&banner.bbox, surface.width(), surface.height());
    assert_eq!(
        pixel_region,
        PixelRegion {
            x: 0.0,
            y: 0.0,
            w: 1000.0,
            h: 20.0
        }
    );
    let plan = plan_layout(&surface, &banner.translated_text, &pixel_region, &config);
    assert_eq!(plan.alignment, Alignment::Center);
    match &plan.fitting {
        Fitting::Fit { font_size, lines } => {
            assert_eq!(lines, &vec!["材质：钢".to_string()]);
            assert!(*font_size <= config.max_font_size);
            assert!(*font_size * 1.2 <= 20.0);
            assert!((*font_size + 1.0) * 1.2 > 20.0);
        }
        other => panic!("expected a fit, got {:?}", other),
    }

    reconstruct(&mut surface, &[banner], &config).expect("reconstruct");
    let result = surface.to_rgba_image().expect("export");
    for y in 0..23 {
        for x in (0..1000).step_by(7) {
            let [r, g, b, _] = result.get_pixel(x, y).0;
            assert!(r >= 240 && g >= 240 && b >= 240, "pixel {},{} is dark", x, y);
        }
    }
    assert_eq!(result.get_pixel(500, 100).0, [240, 240, 240, 255]);
}

#[test]
fn list_translation_is_left_aligned_on_separate_lines() {
    let surface = surface_from(&RgbaImage::from_pixel(600, 300, Rgba([255, 255, 255, 255])));
    let pixel_region = PixelRegion {
        x: 20.0,
        y: 20.0,
        w: 500.0,
        h: 200.0,
    };
    let plan = plan_layout(
        &surface,
        "1. Polish\n2. Anodize",
        &pixel_region,
        &ReconstructionConfig::default(),
    );
    assert_eq!(plan.alignment, Alignment::Left);
    assert_eq!(plan.fitting.lines(), ["1. Polish", "2. Anodize"]);
}

#[test]
fn oversized_word_overflows_without_failing() {
    let mut surface = surface_from(&RgbaImage::from_pixel(300, 100, Rgba([255, 255, 255, 255])));
    let config = ReconstructionConfig::default();
    let text = "Ein Oberflächenbehandlungsverfahrensbeschreibung";
    let regions = vec![region("Surface treatment", text, [100.0, 100.0, 300.0, 300.0], Category::Text)];
    let report = reconstruct(&mut surface, &regions, &config).expect("reconstruct");
    assert_eq!(report.processed, 1);
    assert_eq!(report.overflowed, 1);

    let pixel_region = denormalize(&regions[0].bbox, 300, 100);
    let plan = plan_layout(&surface, text, &pixel_region, &config);
    assert_eq!(
        plan.fitting,
        Fitting::Overflow {
            font_size: config.min_font_size,
            lines: vec![text.to_string()]
        }
    );
}

#[test]
fn erase_samples_only_strips_inside_the_image() {
    let sampling = ReconstructionConfig::default().sampling;
    let mut surface = surface_from(&RgbaImage::from_pixel(50, 50, Rgba([200, 220, 240, 255])));
    let at_top_edge = PixelRegion {
        x: 20.0,
        y: 0.0,
        w: 10.0,
        h: 10.0,
    };
    // only the strip below the padded box lies inside the image
    let outcome = erase(&mut surface, &at_top_edge, 2.0, &sampling);
    assert_eq!(outcome, SampleOutcome::Sampled(Rgb::new(200, 220, 240)));

    let mut dark = surface_from(&RgbaImage::from_pixel(50, 50, Rgba([40, 40, 40, 255])));
    let in_corner = PixelRegion {
        x: 0.0,
        y: 0.0,
        w: 10.0,
        h: 10.0,
    };
    let outcome = erase(&mut dark, &in_corner, 2.0, &sampling);
    assert_eq!(outcome, SampleOutcome::Fallback);
    assert_eq!(dark.read_block(0, 0, 2, 1), vec![Rgb::WHITE, Rgb::WHITE]);
    assert_eq!(dark.read_block(13, 13, 1, 1), vec![Rgb::new(40, 40, 40)]);
}

fn surface_with_installed_fonts(image: &RgbaImage) -> Option<PixmapSurface> {
    let db = load_font_database(None);
    let mut families: Vec<String> = ["DejaVu Sans", "Liberation Sans", "Noto Sans", "Arial"]
        .into_iter()
        .map(String::from)
        .collect();
    if let Some(installed) = db
        .faces()
        .find_map(|info| info.families.first().map(|(name, _)| name.clone()))
    {
        families.push(installed);
    }
    let fonts = resolve_fonts(&db, None, &families).ok()?;
    let style = TextStyle {
        color: "#000000".to_string(),
        font_families: families,
        fonts: fonts.into_iter().map(|font| font.metrics).collect(),
    };
    PixmapSurface::from_rgba(image, style, Arc::new(db)).ok()
}

/// `(min_x, min_y, max_x, max_y)` of the dark pixels.
fn ink_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[0] >= 128 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds
}

fn draw_single_region(translated: &str) -> Option<(PixmapSurface, PixelRegion, f32)> {
    let image = RgbaImage::from_pixel(600, 200, Rgba([255, 255, 255, 255]));
    let Some(mut surface) = surface_with_installed_fonts(&image) else {
        eprintln!("no usable system font installed; skipping");
        return None;
    };
    let config = ReconstructionConfig::default();
    let regions = vec![region("Stahlblech", translated, [250.0, 50.0, 750.0, 950.0], Category::Text)];
    let pixel_region = denormalize(&regions[0].bbox, 600, 200);
    let plan = plan_layout(&surface, translated, &pixel_region, &config);
    assert!(!plan.fitting.is_overflow());
    let measured = surface.measure_text(&plan.fitting.lines()[0], plan.fitting.font_size());

    let report = reconstruct(&mut surface, &regions, &config).expect("reconstruct");
    assert_eq!(report.processed, 1);
    assert_eq!(report.draw_failures, 0);
    Some((surface, pixel_region, measured))
}

#[test]
fn label_translation_is_drawn_centered_inside_its_region() {
    let Some((surface, region, measured)) = draw_single_region("Steel plate") else {
        return;
    };
    let result = surface.to_rgba_image().expect("export");
    let (min_x, min_y, max_x, max_y) = ink_bounds(&result).expect("translation was drawn");

    assert!(min_x as f32 >= region.x && (max_x as f32) < region.x + region.w);
    assert!(min_y as f32 >= region.y && (max_y as f32) < region.y + region.h);
    let ink_center = (min_x + max_x) as f32 / 2.0;
    let region_center = region.x + region.w / 2.0;
    assert!(
        (ink_center - region_center).abs() <= 6.0,
        "ink centered at {}, region at {}",
        ink_center,
        region_center
    );
    // measurement and rendering use the same face
    let ink_width = (max_x - min_x + 1) as f32;
    assert!(
        ink_width <= measured + 2.0 && ink_width >= measured * 0.8,
        "ink {} vs measured {}",
        ink_width,
        measured
    );
}

#[test]
fn list_translation_is_drawn_from_the_left_edge() {
    let Some((surface, region, measured)) = draw_single_region("- Steel plate") else {
        return;
    };
    let result = surface.to_rgba_image().expect("export");
    let (min_x, min_y, max_x, max_y) = ink_bounds(&result).expect("translation was drawn");

    assert!(min_x as f32 >= region.x, "ink starts at {}", min_x);
    assert!((min_x as f32) < region.x + 12.0, "ink starts at {}", min_x);
    assert!(
        max_x as f32 <= region.x + measured + 2.0,
        "ink ends at {}, measured {}",
        max_x,
        measured
    );
    assert!(min_y as f32 >= region.y && (max_y as f32) < region.y + region.h);
}
