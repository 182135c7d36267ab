//! Devices for capabilities a backend cannot provide.

use std::sync::Arc;

use crate::intervention::{
    ColorFilter, ColorMatrix, EffectError, KeyDelayFilter, KeyEvent, KeyInjector, KeyboardHook, PointerDevice,
};

pub struct UnsupportedHook;

impl KeyboardHook for UnsupportedHook {
    fn install(&mut self, _filter: Arc<KeyDelayFilter>) -> Result<(), EffectError> {
        Err(EffectError::Unsupported("keyboard interception"))
    }

    fn uninstall(&mut self) -> Result<(), EffectError> {
        Ok(())
    }
}

pub struct UnsupportedInjector;

impl KeyInjector for UnsupportedInjector {
    fn inject(&self, _event: KeyEvent) -> Result<(), EffectError> {
        Err(EffectError::Unsupported("key injection"))
    }
}

pub struct UnsupportedColorFilter;

impl ColorFilter for UnsupportedColorFilter {
    fn apply(&mut self, _matrix: &ColorMatrix) -> Result<(), EffectError> {
        Err(EffectError::Unsupported("screen color filter"))
    }

    fn clear(&mut self) -> Result<(), EffectError> {
        Ok(())
    }
}

pub struct UnsupportedPointer;

impl PointerDevice for UnsupportedPointer {
    fn position(&self) -> Result<(i32, i32), EffectError> {
        Err(EffectError::Unsupported("pointer control"))
    }

    fn set_position(&self, _x: i32, _y: i32) -> Result<(), EffectError> {
        Err(EffectError::Unsupported("pointer control"))
    }
}
