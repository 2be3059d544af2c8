//! Browser page capability interface and CSS style parsing.
//!
//! The engine never talks to a concrete browser library; it depends on the
//! small [`PageDriver`] surface below, implemented once per automation
//! backend (top-level page and captcha iframe get distinct handles instead
//! of a mutable swap of one reference).

use crate::error::{Result, TuringError};
use regex::Regex;
use std::time::Duration;

/// Selector of the captcha iframe on the host page.
pub const CAPTCHA_FRAME_SELECTOR: &str = "iframe[src*='turing.captcha']";
/// Element that must exist inside the frame before the challenge is usable.
pub const CAPTCHA_READY_SELECTOR: &str = "div.tc-captcha";

/// Minimal browser capabilities the engine needs.
///
/// All methods operate on CSS selectors. `frame` returns a handle scoped to
/// the matched iframe's document; selectors passed to that handle resolve
/// inside the frame.
#[allow(async_fn_in_trait)]
pub trait PageDriver: Sized {
    /// Wait up to `timeout` for a matching element. Returns `false` on
    /// timeout rather than erroring.
    async fn exists(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Attribute value of the first matching element.
    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Attribute values of every matching element, in document order.
    async fn attr_all(&self, selector: &str, name: &str) -> Result<Vec<String>>;

    /// Click the first matching element. Err if nothing matches.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Run a script in the page and return its completion value.
    async fn run_script(&self, script: &str) -> Result<serde_json::Value>;

    /// Handle scoped to the first matching iframe, if present.
    async fn frame(&self, selector: &str) -> Result<Option<Self>>;
}

/// Wait for the captcha iframe to appear and its content to load, returning
/// a driver handle scoped to the frame.
///
/// Returns `Ok(None)` when no captcha is present within the timeout; the
/// caller treats that as "nothing to solve".
pub async fn find_captcha_frame<P: PageDriver>(
    page: &P,
    timeout: Duration,
) -> Result<Option<P>> {
    if !page.exists(CAPTCHA_FRAME_SELECTOR, timeout).await? {
        tracing::debug!("no captcha iframe on page");
        return Ok(None);
    }
    let frame = match page.frame(CAPTCHA_FRAME_SELECTOR).await? {
        Some(f) => f,
        None => {
            return Err(TuringError::Driver(
                "captcha iframe found but frame handle unavailable".into(),
            ))
        }
    };
    if !frame
        .exists(CAPTCHA_READY_SELECTOR, Duration::from_secs(5))
        .await?
    {
        tracing::warn!("captcha iframe present but content never became ready");
        return Ok(None);
    }
    Ok(Some(frame))
}

/// Extract the url(...) target from a CSS style string.
pub fn style_url(style: &str) -> Result<Option<String>> {
    let re = Regex::new(r#"url\(["']?(.*?)["']?\)"#)?;
    Ok(re
        .captures(style)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Extract `width: ...px` from a CSS style string.
pub fn style_width(style: &str) -> Result<Option<f64>> {
    style_px(style, "width")
}

/// Extract `height: ...px` from a CSS style string.
pub fn style_height(style: &str) -> Result<Option<f64>> {
    style_px(style, "height")
}

fn style_px(style: &str, prop: &str) -> Result<Option<f64>> {
    let re = Regex::new(&format!(r"(?:^|[^-\w]){}:\s*([\d.]+)px", prop))?;
    Ok(re
        .captures(style)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok()))
}
