//! Resolution planning arithmetic for the staged generation pipeline.
//!
//! Every pipeline stage has an alignment modulus and a minimum size its
//! dimensions must satisfy. The functions here convert the requested
//! output dimensions into legal per-stage dimensions and compute the
//! padding/cropping offsets needed to recover the requested window from
//! a stage's native output. All functions are pure.

// ---------------------------------------------------------------------------
// Dimension planning
// ---------------------------------------------------------------------------

/// Scale a requested dimension and snap it to a stage-legal value.
///
/// The dimension is multiplied by `scale` (truncating), rounded *down*
/// to the nearest multiple of `alignment`, then clamped up to `minimum`.
/// When the engine exposes its own native compression ratio the result
/// is re-truncated to that ratio as well; the stricter of the two
/// constraints wins. The low-resolution and upscale stages may have a
/// different native ratio than the final decode stage, which is why the
/// ratio is a parameter rather than folded into `alignment`.
pub fn plan_dimension(
    requested: u32,
    scale: f64,
    alignment: u32,
    minimum: u32,
    native_ratio: Option<u32>,
) -> u32 {
    let scaled = (requested as f64 * scale) as u32;
    let mut planned = (scaled / alignment) * alignment;
    planned = planned.max(minimum);
    if let Some(ratio) = native_ratio {
        if ratio > 1 {
            planned -= planned % ratio;
            planned = planned.max(minimum);
        }
    }
    planned
}

/// Plan both spatial dimensions for a stage. Returns `(height, width)`.
pub fn plan(
    height: u32,
    width: u32,
    scale: f64,
    alignment: u32,
    minimum: u32,
    native_ratio: Option<u32>,
) -> (u32, u32) {
    (
        plan_dimension(height, scale, alignment, minimum, native_ratio),
        plan_dimension(width, scale, alignment, minimum, native_ratio),
    )
}

/// Round a dimension up to the next multiple of `alignment`.
///
/// Used to compute the padded decode target for dimensions the engine
/// cannot produce exactly.
pub fn align_up(value: u32, alignment: u32) -> u32 {
    ((value.max(1) - 1) / alignment + 1) * alignment
}

/// Snap a requested frame count to the engine's temporal grid.
///
/// The engine generates `k * temporal_ratio + 1` frames; the result is
/// the smallest such count that covers `requested` frames.
pub fn plan_frame_count(requested: u32, temporal_ratio: u32) -> u32 {
    let n = requested.max(1) as i64;
    let t = temporal_ratio.max(1) as i64;
    (((n - 2).div_euclid(t) + 1) * t + 1) as u32
}

// ---------------------------------------------------------------------------
// Padding and cropping
// ---------------------------------------------------------------------------

/// Four-sided pad amounts mapping requested dimensions onto padded ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Padding {
    /// True when no padding is applied on any side.
    pub fn is_zero(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

/// Pixel window to cut out of a decoded frame: `x`/`y` are the top-left
/// corner, `width`/`height` the extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute the pad offsets that center the requested window inside the
/// padded dimensions. The remainder of an odd split goes to the
/// right/bottom side.
pub fn padding(height: u32, width: u32, padded_height: u32, padded_width: u32) -> Padding {
    let pad_h = padded_height.saturating_sub(height);
    let pad_w = padded_width.saturating_sub(width);
    let top = pad_h / 2;
    let left = pad_w / 2;
    Padding {
        left,
        right: pad_w - left,
        top,
        bottom: pad_h - top,
    }
}

/// Invert `padding` against a decoded frame of `frame_height` x
/// `frame_width` pixels.
///
/// Crop amounts are negative offsets from the far edge. A zero crop on
/// the bottom or right side means "no cropping", not "crop to the
/// edge's own coordinate"; without the explicit zero check the window
/// would silently collapse to zero height/width whenever a side needed
/// no padding.
pub fn crop_window(pad: &Padding, frame_height: u32, frame_width: u32) -> CropWindow {
    let bottom = if pad.bottom == 0 {
        frame_height
    } else {
        frame_height.saturating_sub(pad.bottom)
    };
    let right = if pad.right == 0 {
        frame_width
    } else {
        frame_width.saturating_sub(pad.right)
    };
    let y = pad.top.min(bottom);
    let x = pad.left.min(right);
    CropWindow {
        x,
        y,
        width: right - x,
        height: bottom - y,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
