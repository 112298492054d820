//! Visual-angle to screen-pixel conversion for the stimulus layout.
//!
//! Offsets are expressed in degrees from the screen centre, positive x to the
//! right and positive y upwards. Pixel coordinates follow the display
//! convention with y growing downwards.

use crate::error::{Result, SvopError};
use crate::stimulus::StimulusPoint;

/// Width of the on-screen control sidebar kept clear of stimuli.
pub const SIDEBAR_WIDTH_PX: i32 = 140;

/// Extra clearance between a stimulus edge and the screen edge.
pub const EDGE_CLEARANCE_PX: i32 = 10;

/// Point counts with a defined layout.
pub const SUPPORTED_POINT_COUNTS: [usize; 3] = [5, 9, 13];

const LAYOUT_5: [(f64, f64); 5] = [(10.0, 10.0), (0.0, 0.0), (-10.0, 10.0), (10.0, -10.0), (-10.0, -10.0)];

const LAYOUT_9: [(f64, f64); 9] = [
    (0.0, 10.0),
    (10.0, 10.0),
    (-10.0, 10.0),
    (10.0, -10.0),
    (-10.0, -10.0),
    (0.0, 20.0),
    (20.0, 0.0),
    (-20.0, 0.0),
    (0.0, -20.0),
];

const LAYOUT_13: [(f64, f64); 13] = [
    (0.0, 0.0),
    (10.0, 10.0),
    (-10.0, 10.0),
    (10.0, -10.0),
    (-10.0, -10.0),
    (0.0, 20.0),
    (20.0, 0.0),
    (-20.0, 0.0),
    (0.0, -20.0),
    (15.0, 15.0),
    (-15.0, 15.0),
    (15.0, -15.0),
    (-15.0, -15.0),
];

/// Physical description of the display as seen from the subject's eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    pub width_px: i32,
    pub height_px: i32,
    pub pixels_per_cm: f64,
    pub distance_cm: f64,
}

impl ScreenGeometry {
    /// Derives pixel density from the visible width of the panel.
    pub fn from_physical(width_px: u32, height_px: u32, width_cm: f64, distance_cm: f64) -> Result<Self> {
        if width_px == 0 || height_px == 0 {
            return Err(SvopError::config("screen resolution must be non-zero"));
        }
        if !(width_cm > 0.0) {
            return Err(SvopError::config(format!("screen width must be positive, got {width_cm} cm")));
        }
        if !(distance_cm > 0.0) {
            return Err(SvopError::config(format!(
                "viewing distance must be positive, got {distance_cm} cm"
            )));
        }
        Ok(Self {
            width_px: width_px as i32,
            height_px: height_px as i32,
            pixels_per_cm: width_px as f64 / width_cm,
            distance_cm,
        })
    }

    /// Signed pixel offset of a visual angle from the screen centre.
    pub fn degrees_to_pixels(&self, deg: f64) -> i32 {
        (self.pixels_per_cm * deg.to_radians().tan() * self.distance_cm) as i32
    }
}

/// On-screen diameter of a target subtending `angle_deg` at `distance_cm`.
pub fn angular_to_pixel_diameter(angle_deg: f64, distance_cm: f64, pixels_per_cm: f64) -> Result<i32> {
    if !(angle_deg > 0.0 && angle_deg < 180.0) {
        return Err(SvopError::config(format!("visual angle must be in (0, 180), got {angle_deg}")));
    }
    if !(distance_cm > 0.0) || !(pixels_per_cm > 0.0) {
        return Err(SvopError::config("distance and pixel density must be positive"));
    }
    let size_cm = 2.0 * distance_cm * (angle_deg / 2.0).to_radians().tan();
    Ok((size_cm * pixels_per_cm) as i32)
}

/// Angular offsets of the named layout for `n` points.
pub fn generate_points(n: usize) -> Result<&'static [(f64, f64)]> {
    match n {
        5 => Ok(&LAYOUT_5),
        9 => Ok(&LAYOUT_9),
        13 => Ok(&LAYOUT_13),
        other => Err(SvopError::config(format!("point count must be 5, 9 or 13, got {other}"))),
    }
}

/// Minimum distance between a stimulus centre and any screen edge.
pub fn margin(diameter_px: i32) -> i32 {
    diameter_px / 2 + EDGE_CLEARANCE_PX
}

/// Projects angular offsets onto the screen and clamps them into the usable area.
///
/// The right-hand bound additionally gives up `reserved_sidebar_px` so stimuli
/// never sit underneath the control sidebar.
pub fn convert_to_pixels(
    degree_points: &[(f64, f64)],
    screen: &ScreenGeometry,
    diameter_px: i32,
    reserved_sidebar_px: i32,
) -> Vec<StimulusPoint> {
    let m = margin(diameter_px);
    let right = (screen.width_px - m - reserved_sidebar_px).max(m);
    let bottom = (screen.height_px - m).max(m);
    let (cx, cy) = (screen.width_px / 2, screen.height_px / 2);

    degree_points
        .iter()
        .enumerate()
        .map(|(i, &(dx, dy))| {
            let x = cx + screen.degrees_to_pixels(dx);
            let y = cy - screen.degrees_to_pixels(dy);
            StimulusPoint::new(i + 1, x.clamp(m, right), y.clamp(m, bottom))
        })
        .collect()
}
