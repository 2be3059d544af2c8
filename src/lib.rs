//! # chaser-tc
//!
//! A Rust solver for the Tencent turing "click the matching icons" captcha.
//!
//! ## How it works
//!
//! The engine resolves click targets through a layered vision pipeline:
//!
//! 1. **Acquire**: locate and download the challenge background and the
//!    three-icon instruction sprite, with retry and payload validation.
//! 2. **Quality gate**: classify each sprite slice and bail out early on
//!    the near-blank placeholders the service sometimes serves.
//! 3. **Detect**: run the object-detection model over the background,
//!    prune overlapping boxes with area-ranked NMS, and keep a
//!    whole-image multi-scale template match per icon as a recovery
//!    signal.
//! 4. **Score**: fuse keypoint-match ratio with multi-scale normalized
//!    template correlation for every (icon, candidate) pair.
//! 5. **Assign**: greedy global assignment so two icons never silently
//!    claim the same box, with an explicit low-confidence fallback.
//! 6. **Click & verify**: scale-convert the targets into element space,
//!    dispatch jittered synthetic pointer sequences, submit, and check
//!    the verdict, refreshing and retrying on failure.
//!
//! ## Integration points
//!
//! The crate talks to the outside world through three small traits and
//! never depends on a concrete browser, model runtime, or push channel:
//!
//! - [`page::PageDriver`]: element lookup, attributes, script injection.
//! - [`recognize::Recognizer`]: `classify` and `detect`. An ONNX Runtime
//!   implementation ships behind the `onnx` feature.
//! - [`notify::Notifier`]: terminal (title, body) notifications.
//!
//! ## Quick start
//!
//! ```ignore
//! use chaser_tc::{page, Turing};
//! use std::time::Duration;
//!
//! let frame = page::find_captcha_frame(&my_page, Duration::from_secs(10))
//!     .await?
//!     .expect("captcha iframe present");
//!
//! let mut solver = Turing::builder(frame, my_recognizer).build()?;
//! let report = solver.solve().await?;
//! println!("solved in {} attempts", report.attempts);
//! ```

// Allow missing docs for internal types for now
#![allow(missing_docs)]

pub mod client;
pub mod error;
pub mod fetch;
pub mod models;
pub mod notify;
pub mod page;
pub mod pointer;
pub mod recognize;
pub mod vision;

// Re-exports for convenience
pub use client::{Turing, TuringBuilder};
pub use error::{Result, TuringError};
pub use models::{AttemptOutcome, SolveReport, SolverConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_consistent() {
        let config = SolverConfig::default();
        assert!(config.min_similarity > 0.0 && config.min_similarity < 1.0);
        assert!(config.nms_iou > 0.0 && config.nms_iou < 1.0);
        assert!(config.nms_max_keep >= models::ICON_COUNT);
        assert!(config.max_attempts >= 1);
        assert!(config.template_scales.contains(&1.0));
    }
}
