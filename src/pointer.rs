//! Pointer-action planning and synthetic event dispatch.
//!
//! Detected coordinates live in background-image pixel space; the element
//! on screen is scaled, so every click is converted through
//! `offset + detected / raw · display`, clamped away from the element
//! edges, and jittered by 1–2 px so repeated solves never land on the
//! exact same pixel.

use rand::Rng;
use std::time::Duration;

use crate::error::Result;
use crate::models::{Assignment, ClickPlan, PlannedClick};
use crate::page::PageDriver;

/// Pixels kept clear of the element edges.
const EDGE_MARGIN_LOW: i64 = 2;
const EDGE_MARGIN_HIGH: i64 = 3;

/// Convert one detected coordinate into the displayed element's space.
///
/// The result is clamped to `[2, display − 3]`; a click on the exact edge
/// of the element is swallowed by the page, so the margin is part of the
/// contract.
pub fn to_display(detected: u32, raw_dim: u32, display_dim: f64, offset: f64) -> i64 {
    let scaled = if raw_dim == 0 {
        offset
    } else {
        offset + detected as f64 / raw_dim as f64 * display_dim
    };
    let upper = ((display_dim.round() as i64) - EDGE_MARGIN_HIGH).max(EDGE_MARGIN_LOW);
    (scaled as i64).clamp(EDGE_MARGIN_LOW, upper)
}

/// Turn an assignment into the ordered click sequence.
///
/// Zero-confidence targets are dropped: a click with no evidence behind it
/// is worse than an omission, since the verifier scores wrong clicks
/// against the submission.
pub fn plan_clicks<R: Rng>(
    assignment: &Assignment,
    raw: (u32, u32),
    display: (f64, f64),
    rng: &mut R,
) -> ClickPlan {
    let mut clicks = Vec::new();
    let mut targets = assignment.targets.clone();
    targets.sort_by_key(|t| t.icon_index);

    for t in &targets {
        if t.similarity <= 0.0 {
            tracing::warn!(icon = t.icon_index, "zero-confidence target skipped");
            continue;
        }
        let x = to_display(t.center.0, raw.0, display.0, 0.0) + rng.gen_range(1..=2);
        let y = to_display(t.center.1, raw.1, display.1, 0.0) + rng.gen_range(1..=2);
        clicks.push(PlannedClick {
            icon_index: t.icon_index,
            x,
            y,
        });
    }
    ClickPlan { clicks }
}

/// Random positions inside the display area, used when resolution failed
/// outright and a blind submission is still preferred over none.
pub fn random_clicks<R: Rng>(display: (f64, f64), count: usize, rng: &mut R) -> ClickPlan {
    let clamp_range = |dim: f64| {
        let hi = (dim as i64 - 50).max(51);
        50..hi.max(52)
    };
    let clicks = (0..count)
        .map(|i| PlannedClick {
            icon_index: i + 1,
            x: rng.gen_range(clamp_range(display.0)),
            y: rng.gen_range(clamp_range(display.1)),
        })
        .collect();
    ClickPlan { clicks }
}

/// Synthetic pointer-event sequence at an element-relative position.
///
/// Dispatching through injected script rather than a driver-level click
/// keeps the event coordinates identical regardless of how the automation
/// backend interprets offset origins.
pub fn pointer_script(element_id: &str, x: i64, y: i64) -> String {
    format!(
        r#"var e=document.getElementById('{id}');
if(e){{
  var r=e.getBoundingClientRect();
  var cx=Math.round(r.left+{x});
  var cy=Math.round(r.top+{y});
  ['mousemove','mousedown','mouseup','click'].forEach(function(t){{
    e.dispatchEvent(new MouseEvent(t,{{bubbles:true,cancelable:true,view:window,clientX:cx,clientY:cy}}));
  }});
}}"#,
        id = element_id,
        x = x,
        y = y
    )
}

/// Dispatch a click plan against the element, pacing clicks to mimic a
/// human working through the icons.
pub async fn dispatch<P: PageDriver>(
    page: &P,
    element_id: &str,
    plan: &ClickPlan,
    delay: Duration,
) -> Result<()> {
    for click in &plan.clicks {
        tracing::info!(
            icon = click.icon_index,
            x = click.x,
            y = click.y,
            "dispatching pointer sequence"
        );
        page.run_script(&pointer_script(element_id, click.x, click.y))
            .await?;
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignedTarget;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn to_display_stays_inside_margins() {
        let (raw_w, disp_w) = (672u32, 340.0f64);
        for detected in [0u32, 1, 100, 336, 671, 672] {
            let x = to_display(detected, raw_w, disp_w, 0.0);
            assert!((2..=337).contains(&x), "x {} out of range", x);
        }
    }

    #[test]
    fn to_display_edge_cases() {
        // Top-left corner pins to the low margin.
        assert_eq!(to_display(0, 672, 340.0, 0.0), 2);
        // Bottom-right corner pins to the high margin.
        assert_eq!(to_display(672, 672, 340.0, 0.0), 337);
    }

    #[test]
    fn to_display_scales_linearly() {
        // Halfway through the raw image lands halfway across the display.
        assert_eq!(to_display(336, 672, 340.0, 0.0), 170);
    }

    #[test]
    fn to_display_applies_offset() {
        assert_eq!(to_display(336, 672, 300.0, 10.0), 160);
    }

    fn target(icon: usize, sim: f64) -> AssignedTarget {
        AssignedTarget {
            icon_index: icon,
            similarity: sim,
            center: (100, 100),
            candidate_id: Some(icon),
            low_confidence: false,
        }
    }

    #[test]
    fn plan_skips_zero_confidence_targets() {
        let assignment = Assignment {
            targets: vec![target(1, 0.0), target(2, 0.0), target(3, 0.0)],
        };
        let mut rng = StdRng::seed_from_u64(1);
        let plan = plan_clicks(&assignment, (672, 480), (340.0, 240.0), &mut rng);
        assert!(plan.clicks.is_empty());
    }

    #[test]
    fn plan_preserves_icon_order() {
        let assignment = Assignment {
            targets: vec![target(3, 0.5), target(1, 0.9), target(2, 0.7)],
        };
        let mut rng = StdRng::seed_from_u64(2);
        let plan = plan_clicks(&assignment, (672, 480), (340.0, 240.0), &mut rng);
        let order: Vec<usize> = plan.clicks.iter().map(|c| c.icon_index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn plan_jitter_stays_within_two_pixels_of_clamped_point() {
        let assignment = Assignment {
            targets: vec![target(1, 0.9)],
        };
        let mut rng = StdRng::seed_from_u64(3);
        let plan = plan_clicks(&assignment, (672, 480), (340.0, 240.0), &mut rng);
        let base_x = to_display(100, 672, 340.0, 0.0);
        let base_y = to_display(100, 480, 240.0, 0.0);
        let c = plan.clicks[0];
        assert!((c.x - base_x) >= 1 && (c.x - base_x) <= 2);
        assert!((c.y - base_y) >= 1 && (c.y - base_y) <= 2);
    }

    #[test]
    fn random_clicks_land_inside_safe_area() {
        let mut rng = StdRng::seed_from_u64(4);
        let plan = random_clicks((340.0, 240.0), 3, &mut rng);
        assert_eq!(plan.clicks.len(), 3);
        for c in &plan.clicks {
            assert!((50..=290).contains(&c.x));
            assert!((50..=190).contains(&c.y));
        }
    }

    #[test]
    fn pointer_script_embeds_target() {
        let js = pointer_script("slideBg", 123, 45);
        assert!(js.contains("slideBg"));
        assert!(js.contains("r.left+123"));
        assert!(js.contains("r.top+45"));
        assert!(js.contains("mousedown"));
    }
}
