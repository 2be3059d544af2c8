//! Candidate extraction: NMS over learned-detector boxes and the
//! whole-image template fallback.

use image::{imageops, DynamicImage, GrayImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

use crate::models::{BBox, CandidateRegion, GlobalMatch, ICON_COUNT};
use crate::vision::preprocess;

/// Non-maximum suppression.
///
/// The detector reports no confidence, so boxes are ranked by area: the
/// challenge icons are the dominant shapes, and fragments of a shape are
/// strictly smaller than the shape itself. A box survives only if its IoU
/// against every previously kept box stays below `iou_thresh`, and at most
/// `max_keep` boxes survive.
pub fn nms(mut boxes: Vec<BBox>, iou_thresh: f64, max_keep: usize) -> Vec<BBox> {
    boxes.sort_by(|a, b| b.area().cmp(&a.area()));
    let mut kept: Vec<BBox> = Vec::new();
    for b in boxes {
        if kept.len() >= max_keep {
            break;
        }
        if kept.iter().all(|k| b.iou(k) < iou_thresh) {
            kept.push(b);
        }
    }
    kept
}

/// Crop and preprocess each surviving box into a [`CandidateRegion`].
pub fn build_candidates(
    background: &DynamicImage,
    boxes: &[BBox],
    clahe_clip: f32,
    clahe_grid: u32,
) -> Vec<CandidateRegion> {
    boxes
        .iter()
        .enumerate()
        .filter(|(_, b)| b.width() > 0 && b.height() > 0)
        .map(|(id, b)| {
            let patch = background.crop_imm(b.x1, b.y1, b.width(), b.height());
            CandidateRegion {
                id,
                bbox: *b,
                patch: preprocess::prepare(&patch, clahe_clip, clahe_grid),
            }
        })
        .collect()
}

/// Best normalized correlation of `template` against `target` over the
/// given scale sweep, with the matching center in target coordinates.
///
/// Returns a zero score centered on the target when no scale fits.
pub fn best_template_match(
    template: &GrayImage,
    target: &GrayImage,
    scales: &[f32],
) -> (f64, (u32, u32)) {
    let (tw, th) = target.dimensions();
    let mut best_score = 0.0f64;
    let mut best_center = (tw / 2, th / 2);

    for &scale in scales {
        let w = ((template.width() as f32 * scale) as u32).max(1);
        let h = ((template.height() as f32 * scale) as u32).max(1);
        if w >= tw || h >= th {
            continue;
        }
        let scaled = if (scale - 1.0).abs() < 1e-6 {
            template.clone()
        } else {
            imageops::resize(template, w, h, imageops::FilterType::Triangle)
        };
        let result = match_template(
            target,
            &scaled,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );
        let extremes = find_extremes(&result);
        let score = extremes.max_value as f64;
        if score > best_score {
            let (x, y) = extremes.max_value_location;
            best_score = score;
            best_center = (x + scaled.width() / 2, y + scaled.height() / 2);
        }
    }
    (best_score, best_center)
}

/// Whole-image multi-scale template matching of each reference icon
/// against the edge-filtered background.
///
/// This is a supplementary signal, not a candidate source: its per-icon
/// best location is merged into scoring when it beats every detector
/// candidate, recovering cases where the learned detector missed the true
/// region entirely.
pub fn locate_icons_by_template(
    background_gray: &GrayImage,
    icon_templates: &[GrayImage],
    scales: &[f32],
) -> Vec<Option<GlobalMatch>> {
    let background_edges = preprocess::edges(background_gray);
    let mut results = Vec::with_capacity(ICON_COUNT);
    for (i, template) in icon_templates.iter().enumerate() {
        let template_edges = preprocess::edges(template);
        let (score, center) = best_template_match(&template_edges, &background_edges, scales);
        tracing::debug!(icon = i + 1, score, ?center, "whole-image template match");
        results.push(if score > 0.0 {
            Some(GlobalMatch {
                similarity: score,
                center,
            })
        } else {
            None
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes_overlapping() -> Vec<BBox> {
        vec![
            BBox::new(0, 0, 40, 40),
            BBox::new(2, 2, 40, 40),  // heavy overlap with the first
            BBox::new(100, 0, 130, 30),
            BBox::new(0, 100, 20, 120),
        ]
    }

    #[test]
    fn nms_invariant_pairwise_iou_below_threshold() {
        let kept = nms(boxes_overlapping(), 0.3, 8);
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                assert!(a.iou(b) < 0.3, "kept boxes overlap: {:?} {:?}", a, b);
            }
        }
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn nms_respects_cap() {
        let boxes: Vec<BBox> = (0..20)
            .map(|i| BBox::new(i * 50, 0, i * 50 + 30, 30))
            .collect();
        let kept = nms(boxes, 0.3, 6);
        assert_eq!(kept.len(), 6);
    }

    #[test]
    fn nms_keeps_larger_box_of_a_cluster() {
        let kept = nms(boxes_overlapping(), 0.3, 8);
        // Area sort puts the 40x40 first; the shifted duplicate is culled.
        assert!(kept.contains(&BBox::new(0, 0, 40, 40)));
        assert!(!kept.contains(&BBox::new(2, 2, 40, 40)));
    }

    #[test]
    fn nms_empty_input() {
        assert!(nms(Vec::new(), 0.3, 8).is_empty());
    }

    #[test]
    fn template_match_finds_planted_patch() {
        // Plant a distinctive 12x12 block in a flat background.
        let mut target = GrayImage::from_pixel(80, 60, image::Luma([20]));
        for y in 0..12 {
            for x in 0..12 {
                let v = if (x + y) % 2 == 0 { 230 } else { 40 };
                target.put_pixel(30 + x, 20 + y, image::Luma([v]));
            }
        }
        let template = imageops::crop_imm(&target, 30, 20, 12, 12).to_image();

        let (score, center) = best_template_match(&template, &target, &[1.0]);
        assert!(score > 0.9, "score too low: {}", score);
        assert!((center.0 as i64 - 36).abs() <= 1);
        assert!((center.1 as i64 - 26).abs() <= 1);
    }

    #[test]
    fn template_match_oversized_template_scores_zero() {
        let template = GrayImage::new(50, 50);
        let target = GrayImage::new(20, 20);
        let (score, center) = best_template_match(&template, &target, &[1.0]);
        assert_eq!(score, 0.0);
        assert_eq!(center, (10, 10));
    }
}
