//! [`SensorSuite`] – the read-only half of the hardware contract.
//!
//! Exactly one context (the sensor capture loop) owns the suite; downstream
//! consumers only ever see its output through the latest-value cell.  Every
//! method is a single blocking hardware read that either returns a value or a
//! [`SomaError`]; retry and degradation policy live in the capture loop, not
//! in the driver.

use soma_types::{Frame, SomaError, TouchState};

/// Camera and body sensors.
///
/// Implementations use interior mutability where the underlying driver needs
/// it; the trait is shared behind an `Arc` with the capture loop as the only
/// caller.
pub trait SensorSuite: Send + Sync {
    /// Capture one encoded camera frame.
    fn capture_frame(&self) -> Result<Frame, SomaError>;

    /// Read the dual-touch sensor.
    fn read_touch(&self) -> Result<TouchState, SomaError>;

    /// Read the battery voltage in volts.
    fn read_battery(&self) -> Result<f32, SomaError>;

    /// Read body pitch and roll from the IMU, in degrees.
    fn read_imu(&self) -> Result<(f32, f32), SomaError>;

    /// Read the sound-direction sensor.
    ///
    /// Returns `Ok(Some(bearing))` (0–360°) when a sound was detected since
    /// the last read, `Ok(None)` otherwise.
    fn read_sound_direction(&self) -> Result<Option<u16>, SomaError>;
}
