//! [`Actuators`] – the write half of the hardware contract.
//!
//! The action executor is the only caller; it serialises commands per
//! actuator group before any of these methods run, so implementations do not
//! need their own cross-group locking.  Every call blocks until the physical
//! motion/output completes – motion-to-completion is a safety invariant, and
//! a partially executed movement is never retried by the caller.

use soma_types::{RgbMode, SomaError};

/// Gait servos, head servos, RGB strip, and speaker.
pub trait Actuators: Send + Sync {
    /// Run a named gait/posture for `steps` repetitions at `speed` (1–100).
    fn perform(&self, action: &str, steps: u8, speed: u8) -> Result<(), SomaError>;

    /// Move the head to the absolute pose (degrees) and hold it.
    fn set_head(&self, yaw: f32, roll: f32, pitch: f32) -> Result<(), SomaError>;

    /// Apply colour and animation to the RGB strip.
    fn set_rgb(&self, r: u8, g: u8, b: u8, mode: RgbMode, bps: f32) -> Result<(), SomaError>;

    /// Speak `text` through the TTS voice; returns when playback finishes.
    fn speak(&self, text: &str) -> Result<(), SomaError>;

    /// Play a built-in sound effect to completion.
    fn play_sound(&self, name: &str) -> Result<(), SomaError>;

    /// Park the body for shutdown: sit down, switch the LEDs off.
    fn park(&self) -> Result<(), SomaError>;
}
