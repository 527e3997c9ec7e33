//! Toolkit-space and device-space geometry primitives.

use std::fmt;

/// Pixel dimensions of a surface, image or buffer (device pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Bytes per row of a 32-bit-per-pixel image of this size
    pub fn stride(&self) -> u64 {
        self.width as u64 * 4
    }

    /// Total byte length of a 32-bit-per-pixel image of this size
    pub fn byte_len(&self) -> u64 {
        self.stride() * self.height as u64
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A position in toolkit (logical, unscaled) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A size in toolkit (logical, unscaled) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogicalSize {
    pub width: f32,
    pub height: f32,
}

impl LogicalSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Converts a toolkit-space length to device pixels, rounding to nearest.
pub fn scale_int(value: f32, scale: f32) -> i32 {
    (value * scale).round() as i32
}

/// Converts a device pixel length back to toolkit space.
pub fn unscale_int(value: u32, scale: f32) -> f32 {
    value as f32 / scale
}

/// Converts a device pixel size to surface-local units, rounding to nearest.
pub fn unscale_size(size: Size, scale: f32) -> Size {
    Size::new(
        unscale_int(size.width, scale).round() as u32,
        unscale_int(size.height, scale).round() as u32,
    )
}
