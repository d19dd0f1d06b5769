//! `soma-types` – shared data model for the SOMA body bridge.
//!
//! Every other crate in the workspace depends on this one.  It defines:
//!
//! - [`ActionCommand`] – the closed, tagged command vocabulary the remote
//!   brain (or the fallback transport) may send to the body.
//! - [`PerceptionSnapshot`] – the structured result of one perception cycle
//!   (faces, objects, room, sensors, optional deep-analysis fields).
//! - [`BodyState`] – the single-writer actuator/pose state owned by the
//!   executor and read by everyone else.
//! - [`SomaError`] – the workspace-wide error taxonomy.

pub mod command;
pub mod error;
pub mod perception;
pub mod state;

pub use command::{ActionCommand, ActuatorGroup, ComboSpec, RgbMode};
pub use error::SomaError;
pub use perception::{
    AudioEvent, BoundingBox, FaceSighting, Frame, ObjectSighting, PerceptionSnapshot,
    SensorReadings, TouchState,
};
pub use state::{BodyState, ExecutionResult, FailedStep, HeadPose, PowerMode, RgbState};
