//! The set of device handles a coordinator drives.

use crate::acquisition::{RangeSource, VisionSource};
use crate::feedback::{AudioOutput, HapticOutput};

/// Owned device handles. Dropping a handle releases the device.
pub struct Devices {
    pub range: Box<dyn RangeSource>,
    pub vision: Option<Box<dyn VisionSource>>,
    pub audio: Box<dyn AudioOutput>,
    pub haptic: Box<dyn HapticOutput>,
}

impl Devices {
    pub fn new(
        range: impl RangeSource,
        audio: impl AudioOutput,
        haptic: impl HapticOutput,
    ) -> Self {
        Self {
            range: Box::new(range),
            vision: None,
            audio: Box::new(audio),
            haptic: Box::new(haptic),
        }
    }

    pub fn with_vision(mut self, vision: impl VisionSource) -> Self {
        self.vision = Some(Box::new(vision));
        self
    }
}
