//! Example: the vision pipeline on a synthetic challenge, no browser.
//!
//! Builds a background with three planted icon patterns plus a decoy,
//! fakes the detector's boxes, and runs slicing → scoring → assignment →
//! click planning end to end.
//!
//! Run with: cargo run --example offline_pipeline

use chaser_tc::models::{BBox, ReferenceIcon, SolverConfig};
use chaser_tc::pointer;
use chaser_tc::vision::{assign, detect, preprocess, score};
use image::{DynamicImage, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

const ICON: u32 = 48;

/// Paint a deterministic texture so every icon is visually distinct.
fn paint_icon(img: &mut RgbImage, x0: u32, y0: u32, kind: usize) {
    for dy in 0..ICON {
        for dx in 0..ICON {
            let on = match kind {
                0 => (dx / 6 + dy / 6) % 2 == 0,           // checkerboard
                1 => dx.abs_diff(dy) < 5 || (ICON - 1 - dx).abs_diff(dy) < 5, // cross
                _ => (dx * dx + dy * dy) % 97 < 40,        // dotted arcs
            };
            let px = if on { Rgb([20, 20, 20]) } else { Rgb([235, 235, 235]) };
            img.put_pixel(x0 + dx, y0 + dy, px);
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = SolverConfig::default();

    // Background with the three true targets and one decoy.
    let mut background = RgbImage::from_pixel(672, 480, Rgb([170, 190, 210]));
    let spots = [(90u32, 80u32), (420, 120), (250, 330)];
    for (i, &(x, y)) in spots.iter().enumerate() {
        paint_icon(&mut background, x, y, i);
    }
    paint_icon(&mut background, 560, 380, 0); // decoy shares icon 1's texture
    let background = DynamicImage::ImageRgb8(background);

    // Instruction sprite: the same three icons side by side.
    let mut sprite = RgbImage::from_pixel(ICON * 3, ICON, Rgb([255, 255, 255]));
    for i in 0..3 {
        paint_icon(&mut sprite, i as u32 * ICON, 0, i);
    }
    let sprite = DynamicImage::ImageRgb8(sprite);

    // Slice the sprite into reference icons.
    let icons: Vec<ReferenceIcon> = preprocess::slice_sprite(&sprite)?
        .into_iter()
        .enumerate()
        .map(|(i, slice)| {
            let raster = DynamicImage::ImageRgba8(slice.to_rgba8());
            ReferenceIcon {
                index: i + 1,
                encoded: preprocess::encode_jpeg(&raster).expect("encode slice"),
                template: preprocess::prepare(&raster, config.clahe_clip, config.clahe_grid),
            }
        })
        .collect();

    // Stand-in for the learned detector: the true boxes plus the decoy,
    // with one overlapping duplicate that NMS must cull.
    let raw_boxes = vec![
        BBox::new(90, 80, 90 + ICON, 80 + ICON),
        BBox::new(94, 84, 94 + ICON, 84 + ICON), // near-duplicate
        BBox::new(420, 120, 420 + ICON, 120 + ICON),
        BBox::new(250, 330, 250 + ICON, 330 + ICON),
        BBox::new(560, 380, 560 + ICON, 380 + ICON),
    ];
    let kept = detect::nms(raw_boxes, config.nms_iou, config.nms_max_keep);
    println!("NMS kept {} candidate boxes", kept.len());

    let candidates =
        detect::build_candidates(&background, &kept, config.clahe_clip, config.clahe_grid);

    let background_gray = preprocess::to_gray(&background);
    let templates: Vec<_> = icons.iter().map(|i| i.template.clone()).collect();
    let global = detect::locate_icons_by_template(
        &background_gray,
        &templates,
        &config.template_scales,
    );

    let per_icon = score::score_pairs(&icons, &candidates, &config.template_scales);
    let assignment = assign::resolve_targets(&per_icon, &global, config.min_similarity);

    println!("\nresolved targets:");
    for t in &assignment.targets {
        println!(
            "  icon {} -> ({}, {})  similarity {:.3}{}",
            t.icon_index,
            t.center.0,
            t.center.1,
            t.similarity,
            if t.low_confidence { "  [low confidence]" } else { "" },
        );
    }
    println!("degenerate: {}", assignment.is_degenerate());

    // Convert into display space as the pointer driver would.
    let mut rng = StdRng::from_entropy();
    let plan = pointer::plan_clicks(
        &assignment,
        (background.width(), background.height()),
        (340.0, 242.0),
        &mut rng,
    );
    println!("\nclick plan (display coordinates):");
    for c in &plan.clicks {
        println!("  icon {} -> ({}, {})", c.icon_index, c.x, c.y);
    }

    Ok(())
}
