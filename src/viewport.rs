use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// CSS pixels per inch used by the browser print pipeline.
pub const CSS_PIXELS_PER_INCH: f64 = 96.0;

/// PDF user-space units (points) per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Fixed browser viewport, doubling as the printed page size.
///
/// The default is A4 at 96 dpi (794x1123 CSS pixels), matching the handbook
/// stylesheet's print geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 794,
            height: 1123,
        }
    }
}

impl Viewport {
    pub fn width_inches(&self) -> f64 {
        f64::from(self.width) / CSS_PIXELS_PER_INCH
    }

    pub fn height_inches(&self) -> f64 {
        f64::from(self.height) / CSS_PIXELS_PER_INCH
    }

    pub fn width_points(&self) -> f64 {
        self.width_inches() * POINTS_PER_INCH
    }

    pub fn height_points(&self) -> f64 {
        self.height_inches() * POINTS_PER_INCH
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid page size format: expected WIDTHxHEIGHT (e.g., 794x1123)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Width must be positive")]
    ZeroWidth,
    #[error("Height must be positive")]
    ZeroHeight,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or(ViewportParseError::InvalidFormat)?;
        if height.contains(['x', 'X']) {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = width
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(width.to_string()))?;
        let height: u32 = height
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(height.to_string()))?;

        if width == 0 {
            return Err(ViewportParseError::ZeroWidth);
        }
        if height == 0 {
            return Err(ViewportParseError::ZeroHeight);
        }

        Ok(Viewport { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
