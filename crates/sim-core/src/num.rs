//! Numeric repair helpers shared by the normalizer and the resolution engine.
//!
//! These mirror the repair-on-read policy of the whole data model: garbage in,
//! bounded number out. A non-finite value is treated as absent and collapses
//! to the lower bound.

/// Clamp `value` into `[min, max]`; non-finite input collapses to `min`.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    if value < min {
        return min;
    }
    if value > max {
        return max;
    }
    value
}

/// Round `value` to the nearest multiple of `step` anchored at `anchor`.
///
/// A step below 1 (or non-finite) is treated as 1 so the result is always
/// well-defined.
pub fn round_to_step(value: f64, step: f64, anchor: f64) -> f64 {
    let safe_step = if step.is_finite() { step.max(1.0) } else { 1.0 };
    let safe_anchor = if anchor.is_finite() { anchor } else { 0.0 };
    ((value - safe_anchor) / safe_step).round() * safe_step + safe_anchor
}

/// Like [`round_to_step`], but never exceeds `max`: an overshooting result
/// collapses to the largest step-aligned value at or below the bound. Never
/// returns less than `anchor`.
pub fn round_to_step_bounded(value: f64, step: f64, anchor: f64, max: f64) -> f64 {
    let safe_step = if step.is_finite() { step.max(1.0) } else { 1.0 };
    let rounded = round_to_step(value, safe_step, anchor);
    if rounded > max {
        let ceiling = ((max - anchor) / safe_step).floor() * safe_step + anchor;
        ceiling.max(anchor)
    } else {
        rounded.max(anchor)
    }
}

/// Round to one decimal place, the precision used for share and delta
/// percentages everywhere in reports.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
