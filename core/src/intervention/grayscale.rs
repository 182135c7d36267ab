//! Full-screen desaturation.

use super::effects::{EffectError, SessionEffect};
use crate::level::Resource;

/// Row-major 5x5 color transform (RGBA plus translation row).
pub type ColorMatrix = [[f32; 5]; 5];

/// Luminance-weighted desaturation.
pub const GRAYSCALE_MATRIX: ColorMatrix = [
    [0.3, 0.3, 0.3, 0.0, 0.0],
    [0.59, 0.59, 0.59, 0.0, 0.0],
    [0.11, 0.11, 0.11, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 1.0],
];

pub const IDENTITY_MATRIX: ColorMatrix = [
    [1.0, 0.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 0.0, 1.0],
];

/// Compositor-level color transform.
pub trait ColorFilter: Send {
    fn apply(&mut self, matrix: &ColorMatrix) -> Result<(), EffectError>;
    fn clear(&mut self) -> Result<(), EffectError>;
}

pub struct GrayscaleEffect {
    filter: Box<dyn ColorFilter>,
    engaged: bool,
}

impl GrayscaleEffect {
    pub fn new(filter: Box<dyn ColorFilter>) -> Self {
        Self {
            filter,
            engaged: false,
        }
    }
}

impl SessionEffect for GrayscaleEffect {
    fn resource(&self) -> Resource {
        Resource::ColorFilter
    }

    fn acquire(&mut self) -> Result<(), EffectError> {
        if !self.engaged {
            self.filter.apply(&GRAYSCALE_MATRIX)?;
            self.engaged = true;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), EffectError> {
        if self.engaged {
            // Cleared even if the call fails; a stuck filter is not retried.
            self.engaged = false;
            self.filter.clear()?;
        }
        Ok(())
    }

    fn is_engaged(&self) -> bool {
        self.engaged
    }
}
