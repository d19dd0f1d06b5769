//! `soma-hal` – the hardware contract of the body.
//!
//! Two traits partition the hardware between its two owning contexts:
//!
//! - [`SensorSuite`] – camera, touch, IMU, sound direction, battery.  Owned
//!   by the sensor capture loop; nobody else touches the sensors directly.
//! - [`Actuators`] – gait servos, head servos, RGB strip, speaker.  Owned by
//!   the action executor, which serialises access per actuator group.
//!
//! Drivers for real hardware implement both traits; [`sim::SimBody`] provides
//! an in-process implementation so the full stack runs in headless tests and
//! CI without a robot attached.

pub mod actions;
pub mod actuators;
pub mod sensors;
pub mod sim;

pub use actuators::Actuators;
pub use sensors::SensorSuite;
pub use sim::SimBody;
