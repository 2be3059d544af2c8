//! Quality gate over the instruction sprite.
//!
//! The remote service occasionally renders the reference icons as
//! near-blank or corrupted placeholders; matching against those wastes a
//! full detection/scoring pass that cannot succeed. Each slice is run
//! through the classifier and the challenge is rejected when too many
//! slices land in the degenerate label set.

use crate::models::{QualityPolicy, ReferenceIcon, ICON_COUNT};
use crate::recognize::Recognizer;

/// Labels the classifier emits for blank or placeholder slices.
const DEGENERATE_LABELS: [&str; 2] = ["0", "1"];

/// Returns `true` when the sprite is usable under the given policy.
///
/// Classifier failures count as usable: an unreadable slice is no reason
/// to burn a refresh when the challenge may still be solvable.
pub fn gate<R: Recognizer>(
    recognizer: &mut R,
    icons: &[ReferenceIcon],
    policy: QualityPolicy,
) -> bool {
    let mut degenerate = 0usize;
    for icon in icons {
        match recognizer.classify(&icon.encoded) {
            Ok(label) => {
                if DEGENERATE_LABELS.contains(&label.as_str()) {
                    tracing::debug!(icon = icon.index, %label, "slice classified degenerate");
                    degenerate += 1;
                }
            }
            Err(e) => {
                tracing::warn!(icon = icon.index, error = %e, "slice classification failed, treating as usable");
            }
        }
    }

    let usable = match policy {
        QualityPolicy::Strict => degenerate <= ICON_COUNT - 1,
        QualityPolicy::Relaxed => degenerate < ICON_COUNT,
    };
    if !usable {
        tracing::warn!(
            degenerate,
            total = ICON_COUNT,
            ?policy,
            "sprite rejected by quality gate"
        );
    }
    usable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TuringError};
    use crate::models::BBox;
    use image::GrayImage;

    struct StubClassifier {
        labels: Vec<std::result::Result<&'static str, ()>>,
        next: usize,
    }

    impl StubClassifier {
        fn new(labels: Vec<std::result::Result<&'static str, ()>>) -> Self {
            Self { labels, next: 0 }
        }
    }

    impl Recognizer for StubClassifier {
        fn classify(&mut self, _image: &[u8]) -> Result<String> {
            let r = self.labels[self.next % self.labels.len()];
            self.next += 1;
            match r {
                Ok(label) => Ok(label.to_string()),
                Err(()) => Err(TuringError::Recognition("stub failure".into())),
            }
        }

        fn detect(&mut self, _image: &[u8]) -> Result<Vec<BBox>> {
            Ok(Vec::new())
        }
    }

    fn icons() -> Vec<ReferenceIcon> {
        (1..=ICON_COUNT)
            .map(|index| ReferenceIcon {
                index,
                encoded: vec![0u8; 8],
                template: GrayImage::new(4, 4),
            })
            .collect()
    }

    #[test]
    fn all_degenerate_rejected_under_both_policies() {
        let mut stub = StubClassifier::new(vec![Ok("0"), Ok("1"), Ok("0")]);
        assert!(!gate(&mut stub, &icons(), QualityPolicy::Strict));
        let mut stub = StubClassifier::new(vec![Ok("0"), Ok("1"), Ok("0")]);
        assert!(!gate(&mut stub, &icons(), QualityPolicy::Relaxed));
    }

    #[test]
    fn two_degenerate_accepted_under_both_policies() {
        let mut stub = StubClassifier::new(vec![Ok("0"), Ok("1"), Ok("7")]);
        assert!(gate(&mut stub, &icons(), QualityPolicy::Strict));
        let mut stub = StubClassifier::new(vec![Ok("0"), Ok("1"), Ok("7")]);
        assert!(gate(&mut stub, &icons(), QualityPolicy::Relaxed));
    }

    #[test]
    fn clean_sprite_accepted() {
        let mut stub = StubClassifier::new(vec![Ok("a"), Ok("b"), Ok("c")]);
        assert!(gate(&mut stub, &icons(), QualityPolicy::Strict));
    }

    #[test]
    fn classifier_error_counts_as_usable() {
        let mut stub = StubClassifier::new(vec![Err(()), Err(()), Err(())]);
        assert!(gate(&mut stub, &icons(), QualityPolicy::Strict));
    }
}
