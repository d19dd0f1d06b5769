//! `soma-perception` – the sensing half of the body.
//!
//! Two loops connected by single-slot latest-value cells:
//!
//! 1. [`capture::CaptureLoop`] owns the camera and body sensors and publishes
//!    a fresh [`capture::RawCapture`] on a fixed cadence.
//! 2. [`pipeline::Pipeline`] consumes captures, runs the face/object
//!    detector black boxes, consults the memory store for identities and
//!    rooms, and publishes one [`PerceptionSnapshot`][soma_types::PerceptionSnapshot]
//!    per processed frame.
//!
//! The cells ([`cell::LatestCell`]) enforce last-write-wins with a monotonic
//! sequence guard: freshness over completeness, drops are expected under
//! load, and a reader never observes an older snapshot after a newer one.

pub mod analyzer;
pub mod capture;
pub mod cell;
pub mod detect;
pub mod pipeline;

pub use capture::{CaptureLoop, RawCapture};
pub use cell::{LatestCell, LatestReader};
pub use detect::{DetectedFace, FaceDetector, FeatureExtractor, ObjectDetector};
pub use pipeline::{Pipeline, PipelineConfig, normalize_bearing};
