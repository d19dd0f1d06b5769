//! Detector black boxes consumed by the pipeline.
//!
//! Face/object detection and scene-feature extraction are external
//! classifiers as far as this crate is concerned: they take a frame and
//! return boxes, scores, and vectors.  Real model wrappers implement these
//! traits; the `Static*` implementations return scripted results so the full
//! pipeline runs in headless tests and simulation.

use std::sync::Mutex;

use soma_types::{BoundingBox, Frame, ObjectSighting, SomaError};

/// One face found in a frame, before identification.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub rect: BoundingBox,
    /// Detector confidence that this is a face at all.
    pub confidence: f32,
    /// Embedding vector used for identity matching.
    pub encoding: Vec<f32>,
}

/// Face detection + encoding, as a single black box.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectedFace>, SomaError>;
}

/// Object detection black box.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<ObjectSighting>, SomaError>;
}

/// Whole-scene feature extraction used for room matching.
pub trait FeatureExtractor: Send + Sync {
    fn features(&self, frame: &Frame) -> Result<Vec<f32>, SomaError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted doubles (simulation and tests)
// ─────────────────────────────────────────────────────────────────────────────

/// A [`FaceDetector`] that returns whatever it was last told to see.
#[derive(Default)]
pub struct StaticFaceDetector {
    faces: Mutex<Vec<DetectedFace>>,
}

impl StaticFaceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, faces: Vec<DetectedFace>) {
        *self.faces.lock().unwrap() = faces;
    }
}

impl FaceDetector for StaticFaceDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<DetectedFace>, SomaError> {
        Ok(self.faces.lock().unwrap().clone())
    }
}

/// An [`ObjectDetector`] that returns whatever it was last told to see.
#[derive(Default)]
pub struct StaticObjectDetector {
    objects: Mutex<Vec<ObjectSighting>>,
}

impl StaticObjectDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, objects: Vec<ObjectSighting>) {
        *self.objects.lock().unwrap() = objects;
    }
}

impl ObjectDetector for StaticObjectDetector {
    fn detect(&self, _frame: &Frame) -> Result<Vec<ObjectSighting>, SomaError> {
        Ok(self.objects.lock().unwrap().clone())
    }
}

/// A [`FeatureExtractor`] returning a fixed vector.
pub struct StaticFeatureExtractor {
    features: Vec<f32>,
}

impl StaticFeatureExtractor {
    pub fn new(features: Vec<f32>) -> Self {
        Self { features }
    }
}

impl FeatureExtractor for StaticFeatureExtractor {
    fn features(&self, _frame: &Frame) -> Result<Vec<f32>, SomaError> {
        Ok(self.features.clone())
    }
}
