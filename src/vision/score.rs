//! Similarity scoring: keypoint matching fused with multi-scale template
//! correlation.
//!
//! Keypoints discriminate icon shapes well when the patch has texture;
//! template correlation is the robust fallback when an icon is nearly
//! featureless. Each signal alone is brittle, so both are computed for
//! every (icon, candidate) pair and fused.

use image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{CandidateRegion, ReferenceIcon, ScoredMatch};
use crate::vision::detect::best_template_match;

/// FAST corner threshold.
const FAST_THRESHOLD: u8 = 20;
/// Strongest corners kept per image.
const MAX_KEYPOINTS: usize = 200;
/// Descriptor sampling window (pixels to each side of the keypoint).
const PATCH_RADIUS: i64 = 15;
/// Nearest/second-nearest distance ratio for an accepted match.
const MATCH_RATIO: f64 = 0.8;
/// Weights for fusing the two signals when both fire.
const KEYPOINT_WEIGHT: f64 = 0.6;
const TEMPLATE_WEIGHT: f64 = 0.4;
/// Discount applied when only the keypoint signal fired.
const LONE_KEYPOINT_DISCOUNT: f64 = 0.8;

/// 256-bit binary descriptor sampled over a 31×31 window.
type Descriptor = [u64; 4];

/// Intensity-comparison test pairs, fixed across the process so that
/// descriptors from different images are comparable.
fn test_pairs() -> Vec<(i64, i64, i64, i64)> {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    (0..256)
        .map(|_| {
            (
                rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
            )
        })
        .collect()
}

fn describe(img: &GrayImage, pairs: &[(i64, i64, i64, i64)]) -> Vec<Descriptor> {
    let (w, h) = img.dimensions();
    if w as i64 <= 2 * PATCH_RADIUS || h as i64 <= 2 * PATCH_RADIUS {
        return Vec::new();
    }
    let smoothed = gaussian_blur_f32(img, 1.0);
    let mut corners = corners_fast9(&smoothed, FAST_THRESHOLD);
    corners.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    corners.truncate(MAX_KEYPOINTS);

    let mut descriptors = Vec::new();
    for c in corners {
        let (cx, cy) = (c.x as i64, c.y as i64);
        if cx < PATCH_RADIUS
            || cy < PATCH_RADIUS
            || cx + PATCH_RADIUS >= w as i64
            || cy + PATCH_RADIUS >= h as i64
        {
            continue;
        }
        let mut desc: Descriptor = [0; 4];
        for (i, &(x1, y1, x2, y2)) in pairs.iter().enumerate() {
            let a = smoothed.get_pixel((cx + x1) as u32, (cy + y1) as u32)[0];
            let b = smoothed.get_pixel((cx + x2) as u32, (cy + y2) as u32)[0];
            if a < b {
                desc[i / 64] |= 1 << (i % 64);
            }
        }
        descriptors.push(desc);
    }
    descriptors
}

fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

/// Keypoint-match ratio between two rasters.
///
/// Every descriptor of `a` is matched 2-NN against `b`'s descriptors and
/// accepted when the nearest distance is below [`MATCH_RATIO`] times the
/// second-nearest. The score is accepted matches over match attempts;
/// zero when either image yields no keypoints.
pub fn keypoint_score(a: &GrayImage, b: &GrayImage) -> f64 {
    let pairs = test_pairs();
    let desc_a = describe(a, &pairs);
    let desc_b = describe(b, &pairs);
    if desc_a.is_empty() || desc_b.is_empty() {
        return 0.0;
    }

    let mut accepted = 0usize;
    for da in &desc_a {
        let mut best = u32::MAX;
        let mut second = u32::MAX;
        for db in &desc_b {
            let d = hamming(da, db);
            if d < best {
                second = best;
                best = d;
            } else if d < second {
                second = d;
            }
        }
        if second != u32::MAX && (best as f64) < MATCH_RATIO * second as f64 {
            accepted += 1;
        }
    }
    accepted as f64 / desc_a.len() as f64
}

/// Fuse the keypoint and template signals into one ranking score.
///
/// The result is not clamped; fusion weighting can push it marginally past
/// natural bounds, and downstream code treats it as a ranking value only.
pub fn fuse(keypoint: f64, template: f64) -> f64 {
    if keypoint > 0.0 && template > 0.0 {
        KEYPOINT_WEIGHT * keypoint + TEMPLATE_WEIGHT * template
    } else if keypoint > 0.0 {
        keypoint * LONE_KEYPOINT_DISCOUNT
    } else if template > 0.0 {
        template
    } else {
        0.0
    }
}

/// Fused similarity of one reference icon against one candidate patch.
pub fn compute_similarity(icon: &GrayImage, patch: &GrayImage, scales: &[f32]) -> f64 {
    let kp = keypoint_score(icon, patch);
    let (tm, _) = best_template_match(icon, patch, scales);
    fuse(kp, tm)
}

/// Score every (icon, candidate) pair, returning per-icon candidate lists
/// sorted by descending similarity.
pub fn score_pairs(
    icons: &[ReferenceIcon],
    candidates: &[CandidateRegion],
    scales: &[f32],
) -> Vec<Vec<ScoredMatch>> {
    icons
        .iter()
        .map(|icon| {
            let mut row: Vec<ScoredMatch> = candidates
                .iter()
                .map(|cand| {
                    let similarity = compute_similarity(&icon.template, &cand.patch, scales);
                    tracing::debug!(
                        icon = icon.index,
                        candidate = cand.id,
                        similarity,
                        center = ?cand.bbox.center(),
                        "scored pair"
                    );
                    ScoredMatch {
                        icon_index: icon.index,
                        candidate_id: cand.id,
                        similarity,
                        center: cand.bbox.center(),
                    }
                })
                .collect();
            row.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise_image(w: u32, h: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut img = GrayImage::new(w, h);
        for p in img.pixels_mut() {
            p[0] = rng.gen();
        }
        img
    }

    #[test]
    fn fuse_both_signals_weighted() {
        let fused = fuse(0.5, 0.8);
        assert!((fused - (0.6 * 0.5 + 0.4 * 0.8)).abs() < 1e-9);
    }

    #[test]
    fn fuse_lone_keypoint_discounted() {
        assert!((fuse(0.5, 0.0) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn fuse_lone_template_passthrough() {
        assert!((fuse(0.0, 0.7) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn fuse_nothing_is_zero() {
        assert_eq!(fuse(0.0, 0.0), 0.0);
    }

    #[test]
    fn keypoint_score_blank_image_is_zero() {
        let blank = GrayImage::from_pixel(64, 64, image::Luma([128]));
        let textured = noise_image(64, 64, 7);
        assert_eq!(keypoint_score(&blank, &textured), 0.0);
        assert_eq!(keypoint_score(&textured, &blank), 0.0);
    }

    #[test]
    fn keypoint_score_prefers_identical_texture() {
        let a = noise_image(64, 64, 11);
        let b = noise_image(64, 64, 99);
        let same = keypoint_score(&a, &a.clone());
        let different = keypoint_score(&a, &b);
        assert!(
            same > different,
            "identical {} should beat different {}",
            same,
            different
        );
    }

    #[test]
    fn keypoint_score_tiny_image_is_zero() {
        let tiny = GrayImage::new(10, 10);
        let big = noise_image(64, 64, 3);
        assert_eq!(keypoint_score(&tiny, &big), 0.0);
    }

    #[test]
    fn test_pairs_are_deterministic() {
        assert_eq!(test_pairs(), test_pairs());
    }
}
