//! Data models for the turing click-captcha pipeline.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

/// Number of reference icons in an instruction sprite.
pub const ICON_COUNT: usize = 3;

/// Bounding box in background-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Center point of the box.
    pub fn center(&self) -> (u32, u32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BBox) -> f64 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }
        let inter = (x2 - x1) as f64 * (y2 - y1) as f64;
        let union = self.area() as f64 + other.area() as f64 - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// A downloaded challenge: background plus the instruction sprite.
///
/// Owned by a single solve attempt; a refresh invalidates the URLs, so the
/// whole value is discarded and re-acquired rather than re-downloaded.
pub struct Challenge {
    pub background: DynamicImage,
    pub background_bytes: Vec<u8>,
    pub sprite: DynamicImage,
}

/// One of the three ordered icon slices cut from the instruction sprite.
pub struct ReferenceIcon {
    /// 1-based slot in the sprite, which is also the required click order.
    pub index: usize,
    /// Encoded slice bytes, fed to the quality-gate classifier.
    pub encoded: Vec<u8>,
    /// Preprocessed grayscale template used for matching.
    pub template: GrayImage,
}

/// A detected region of the background that may contain a click target.
pub struct CandidateRegion {
    pub id: usize,
    pub bbox: BBox,
    /// Preprocessed grayscale patch cropped from the background.
    pub patch: GrayImage,
}

/// Similarity of one (icon, candidate) pair.
///
/// The score is a fused ranking value and may exceed 1.0 slightly; it is
/// never a probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredMatch {
    pub icon_index: usize,
    pub candidate_id: usize,
    pub similarity: f64,
    pub center: (u32, u32),
}

/// Best whole-image template match for one icon, independent of the
/// learned detector's candidate set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalMatch {
    pub similarity: f64,
    pub center: (u32, u32),
}

/// A click target chosen for one icon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignedTarget {
    pub icon_index: usize,
    pub similarity: f64,
    pub center: (u32, u32),
    /// Candidate box backing this target; `None` when the whole-image
    /// template match won over every detector candidate.
    pub candidate_id: Option<usize>,
    /// Set when the target was filled from a below-floor candidate.
    pub low_confidence: bool,
}

/// The icon → target mapping produced by the assignment solver.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    pub targets: Vec<AssignedTarget>,
}

impl Assignment {
    /// True when two assigned icons resolved to the identical position.
    /// A degenerate assignment is submitted through the fallback path
    /// rather than as-is.
    pub fn is_degenerate(&self) -> bool {
        for (i, a) in self.targets.iter().enumerate() {
            for b in &self.targets[i + 1..] {
                if a.center == b.center {
                    return true;
                }
            }
        }
        false
    }

    pub fn is_complete(&self) -> bool {
        self.targets.len() == ICON_COUNT
    }
}

/// One planned pointer action in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedClick {
    pub icon_index: usize,
    pub x: i64,
    pub y: i64,
}

/// Ordered click sequence derived from an [`Assignment`]; consumed once by
/// the pointer driver.
#[derive(Debug, Clone, Default)]
pub struct ClickPlan {
    pub clicks: Vec<PlannedClick>,
}

/// Quality-gate strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPolicy {
    /// Reject when more than two of the three slices classify as degenerate.
    Strict,
    /// Reject only when all three slices classify as degenerate. Used in CI
    /// environments where the sprite render is often marginal.
    Relaxed,
}

/// Outcome of a single solve attempt, consumed by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The remote service accepted the submission.
    Success,
    /// A challenge URL could not be located or downloaded.
    AcquisitionFailed,
    /// The detector returned no candidate boxes.
    NoCandidates,
    /// The displayed element dimensions could not be resolved.
    NoDisplayDims,
    /// Submission went through but the service rejected it.
    VerificationFailed,
}

impl AttemptOutcome {
    /// Whether the loop should refresh the challenge and try again.
    pub fn requires_refresh(&self) -> bool {
        !matches!(self, AttemptOutcome::Success)
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::AcquisitionFailed => "acquisition failed",
            AttemptOutcome::NoCandidates => "no candidates",
            AttemptOutcome::NoDisplayDims => "no display dimensions",
            AttemptOutcome::VerificationFailed => "verification failed",
        };
        write!(f, "{}", s)
    }
}

/// Tunable thresholds for the resolution pipeline.
///
/// The defaults reproduce the values the production pipeline settled on;
/// every one of them varies slightly between deployments, so all are
/// exposed rather than baked in.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Similarity floor below which greedy assignment stops claiming boxes.
    pub min_similarity: f64,
    /// NMS overlap threshold.
    pub nms_iou: f64,
    /// Maximum candidate boxes surviving NMS.
    pub nms_max_keep: usize,
    /// Template-matching scale sweep.
    pub template_scales: Vec<f32>,
    /// CLAHE clip limit.
    pub clahe_clip: f32,
    /// CLAHE tile grid (n×n).
    pub clahe_grid: u32,
    /// Quality-gate strictness.
    pub quality: QualityPolicy,
    /// Bound on the acquire→verify loop.
    pub max_attempts: u32,
    /// Download retries per image URL.
    pub download_retries: u32,
    /// Smallest payload accepted as a real image.
    pub min_image_bytes: usize,
    /// Pause between icon clicks, mimicking human pacing.
    pub click_delay: std::time::Duration,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.35,
            nms_iou: 0.35,
            nms_max_keep: 8,
            template_scales: vec![0.85, 0.9, 1.0, 1.1, 1.15],
            clahe_clip: 2.0,
            clahe_grid: 8,
            quality: QualityPolicy::Strict,
            max_attempts: 6,
            download_retries: 3,
            min_image_bytes: 1024,
            click_delay: std::time::Duration::from_millis(500),
        }
    }
}

/// Summary of a finished solve.
#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    pub solved: bool,
    pub attempts: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_center_and_area() {
        let b = BBox::new(10, 20, 30, 40);
        assert_eq!(b.center(), (20, 30));
        assert_eq!(b.width(), 20);
        assert_eq!(b.height(), 20);
        assert_eq!(b.area(), 400);
    }

    #[test]
    fn iou_disjoint_is_zero() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(20, 20, 30, 30);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_identical_is_one() {
        let a = BBox::new(5, 5, 15, 15);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn iou_half_overlap() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(5, 0, 15, 10);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_assignment_detects_duplicates() {
        let t = |idx, center| AssignedTarget {
            icon_index: idx,
            similarity: 0.5,
            center,
            candidate_id: Some(idx),
            low_confidence: false,
        };
        let ok = Assignment {
            targets: vec![t(1, (10, 10)), t(2, (20, 20)), t(3, (30, 30))],
        };
        assert!(!ok.is_degenerate());

        let dup = Assignment {
            targets: vec![t(1, (10, 10)), t(2, (10, 10)), t(3, (30, 30))],
        };
        assert!(dup.is_degenerate());
    }

    #[test]
    fn outcome_refresh_policy() {
        assert!(!AttemptOutcome::Success.requires_refresh());
        assert!(AttemptOutcome::AcquisitionFailed.requires_refresh());
        assert!(AttemptOutcome::NoCandidates.requires_refresh());
        assert!(AttemptOutcome::VerificationFailed.requires_refresh());
    }
}
