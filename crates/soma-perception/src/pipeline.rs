//! [`Pipeline`] – turns raw captures into [`PerceptionSnapshot`]s.
//!
//! One snapshot per processed frame: face detection → identity lookup
//! against the memory store, object detection → score filter → sighting
//! log, room matching, and deadline-raced deep analysis (scene description,
//! audio transcription).  The pipeline never waits on a slow analyzer and
//! never fails a cycle because a store write failed; it degrades the
//! affected field and moves on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use soma_memory::MemoryStore;
use soma_types::{AudioEvent, FaceSighting, Frame, ObjectSighting, PerceptionSnapshot, SensorReadings};
use tracing::{debug, warn};

use crate::analyzer::{AudioTranscriber, SceneAnalyzer};
use crate::capture::RawCapture;
use crate::cell::{LatestCell, LatestReader};
use crate::detect::{FaceDetector, FeatureExtractor, ObjectDetector};

/// Convert a raw 0–360° bearing into a signed heading: 0 = dead ahead,
/// negative = left (348° → −12°).
pub fn normalize_bearing(raw: u16) -> i32 {
    let bearing = i32::from(raw % 360);
    if bearing > 180 {
        bearing - 360
    } else {
        bearing
    }
}

/// Pipeline thresholds and deadlines.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Object detections below this score are dropped.
    pub object_score: f32,
    /// Budget for each deep-analysis call per cycle; a miss omits the field.
    pub analysis_deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            object_score: 0.5,
            analysis_deadline: Duration::from_millis(1500),
        }
    }
}

/// The perception pipeline.  Owns the snapshot cell; everything else comes
/// in through constructor handles.
pub struct Pipeline {
    captures: LatestReader<RawCapture>,
    face_detector: Arc<dyn FaceDetector>,
    object_detector: Arc<dyn ObjectDetector>,
    feature_extractor: Option<Arc<dyn FeatureExtractor>>,
    scene_analyzer: Option<Arc<dyn SceneAnalyzer>>,
    transcriber: Option<Arc<dyn AudioTranscriber>>,
    memory: Arc<Mutex<MemoryStore>>,
    cell: LatestCell<PerceptionSnapshot>,
    seq: u64,
    cfg: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        captures: LatestReader<RawCapture>,
        face_detector: Arc<dyn FaceDetector>,
        object_detector: Arc<dyn ObjectDetector>,
        memory: Arc<Mutex<MemoryStore>>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            captures,
            face_detector,
            object_detector,
            feature_extractor: None,
            scene_analyzer: None,
            transcriber: None,
            memory,
            cell: LatestCell::new(),
            seq: 0,
            cfg,
        }
    }

    /// Enable room matching (builder-style).
    pub fn with_feature_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.feature_extractor = Some(extractor);
        self
    }

    /// Enable deep scene description (builder-style).
    pub fn with_scene_analyzer(mut self, analyzer: Arc<dyn SceneAnalyzer>) -> Self {
        self.scene_analyzer = Some(analyzer);
        self
    }

    /// Enable audio transcription (builder-style).
    pub fn with_transcriber(mut self, transcriber: Arc<dyn AudioTranscriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Read handle onto the snapshot cell.  Take before calling `run`.
    pub fn subscribe(&self) -> LatestReader<PerceptionSnapshot> {
        self.cell.subscribe()
    }

    /// Process captures until the capture side goes away.
    pub async fn run(mut self) {
        let mut captures = self.captures.clone();
        loop {
            if captures.changed().await.is_err() {
                break;
            }
            let Some(capture) = captures.latest() else {
                continue;
            };
            let snapshot = self.process(capture).await;
            let seq = snapshot.seq;
            self.cell.publish(seq, snapshot);
        }
    }

    /// One full perception cycle.  Public so tests can drive the pipeline
    /// without the capture cadence.
    pub async fn process(&mut self, capture: RawCapture) -> PerceptionSnapshot {
        let faces = self.identify_faces(&capture.frame);
        let objects = self.detect_objects(&capture.frame);
        let room = self.match_room(&capture.frame);
        let scene_description = self.describe_scene(&capture.frame).await;
        let audio = self.transcribe_audio(&capture.sensors).await;

        self.seq += 1;
        PerceptionSnapshot {
            seq: self.seq,
            ts: Utc::now(),
            faces,
            objects,
            room,
            scene_description,
            audio,
            sensors: capture.sensors,
        }
    }

    // ── Faces ────────────────────────────────────────────────────────────

    fn identify_faces(&self, frame: &Frame) -> Vec<FaceSighting> {
        let detected = match self.face_detector.detect(frame) {
            Ok(detected) => detected,
            Err(e) => {
                warn!(error = %e, "face detection failed");
                return Vec::new();
            }
        };

        let mut sightings = Vec::with_capacity(detected.len());
        for face in detected {
            let matched = self
                .memory
                .lock()
                .unwrap()
                .lookup(&face.encoding)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "face lookup failed");
                    None
                });
            let (name, confidence) = match matched {
                Some((name, similarity)) => (Some(name), similarity),
                None => (None, face.confidence),
            };
            sightings.push(FaceSighting {
                rect: face.rect,
                name,
                confidence,
            });
        }

        // Tie-break: one box per identity per frame, the rest go anonymous.
        let mut best: HashMap<String, usize> = HashMap::new();
        for (i, sighting) in sightings.iter().enumerate() {
            if let Some(name) = &sighting.name {
                let keep = best
                    .get(name)
                    .is_none_or(|&j| sightings[j].confidence < sighting.confidence);
                if keep {
                    best.insert(name.clone(), i);
                }
            }
        }
        for (i, sighting) in sightings.iter_mut().enumerate() {
            if let Some(name) = sighting.name.clone()
                && best.get(&name) != Some(&i)
            {
                debug!(name = %name, "duplicate identity in frame, demoting to anonymous");
                sighting.name = None;
            }
        }
        sightings
    }

    // ── Objects ──────────────────────────────────────────────────────────

    fn detect_objects(&self, frame: &Frame) -> Vec<ObjectSighting> {
        let detected = match self.object_detector.detect(frame) {
            Ok(detected) => detected,
            Err(e) => {
                warn!(error = %e, "object detection failed");
                return Vec::new();
            }
        };

        let kept: Vec<ObjectSighting> = detected
            .into_iter()
            .filter(|o| o.score >= self.cfg.object_score)
            .collect();

        let memory = self.memory.lock().unwrap();
        for sighting in &kept {
            if let Err(e) =
                memory.record_object_sighting(&sighting.class, sighting.rect, Utc::now())
            {
                warn!(class = %sighting.class, error = %e, "object sighting not recorded");
            }
        }
        kept
    }

    // ── Rooms ────────────────────────────────────────────────────────────

    fn match_room(&self, frame: &Frame) -> Option<String> {
        let extractor = self.feature_extractor.as_ref()?;
        let features = match extractor.features(frame) {
            Ok(features) => features,
            Err(e) => {
                debug!(error = %e, "feature extraction failed");
                return None;
            }
        };
        match self.memory.lock().unwrap().match_room(&features) {
            Ok(hit) => hit.map(|(name, _)| name),
            Err(e) => {
                warn!(error = %e, "room match failed");
                None
            }
        }
    }

    // ── Deep analysis ────────────────────────────────────────────────────

    async fn describe_scene(&self, frame: &Frame) -> Option<String> {
        let analyzer = self.scene_analyzer.as_ref()?;
        match tokio::time::timeout(self.cfg.analysis_deadline, analyzer.describe(frame)).await {
            Ok(Ok(description)) => Some(description),
            Ok(Err(e)) => {
                debug!(error = %e, "scene analyzer failed");
                None
            }
            Err(_) => {
                debug!("scene analyzer missed the cycle deadline");
                None
            }
        }
    }

    async fn transcribe_audio(&self, sensors: &SensorReadings) -> Option<AudioEvent> {
        let raw_bearing = sensors.sound_direction?;
        let transcriber = self.transcriber.as_ref()?;
        match tokio::time::timeout(self.cfg.analysis_deadline, transcriber.transcribe()).await {
            Ok(Ok(Some(transcript))) => Some(AudioEvent::new(
                transcript,
                Some(normalize_bearing(raw_bearing)),
            )),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                debug!(error = %e, "audio transcription failed");
                None
            }
            Err(_) => {
                debug!("audio transcription missed the cycle deadline");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{StaticSceneAnalyzer, StaticTranscriber};
    use crate::detect::{
        DetectedFace, StaticFaceDetector, StaticFeatureExtractor, StaticObjectDetector,
    };
    use soma_memory::MemoryConfig;
    use soma_types::{BoundingBox, TouchState};

    fn rect() -> BoundingBox {
        BoundingBox {
            x: 10.0,
            y: 20.0,
            w: 64.0,
            h: 64.0,
        }
    }

    fn capture() -> RawCapture {
        RawCapture {
            ts: Utc::now(),
            frame: Frame {
                width: 640,
                height: 480,
                data: vec![0u8; 16],
            },
            sensors: SensorReadings {
                touch: TouchState::None,
                battery_v: Some(7.9),
                pitch: Some(0.0),
                roll: Some(0.0),
                sound_direction: None,
            },
        }
    }

    struct Rig {
        faces: Arc<StaticFaceDetector>,
        objects: Arc<StaticObjectDetector>,
        memory: Arc<Mutex<MemoryStore>>,
    }

    fn rig() -> (Pipeline, Rig) {
        let faces = Arc::new(StaticFaceDetector::new());
        let objects = Arc::new(StaticObjectDetector::new());
        let memory = Arc::new(Mutex::new(
            MemoryStore::open_in_memory(MemoryConfig::default()).unwrap(),
        ));
        let captures = LatestCell::new().subscribe();
        let pipeline = Pipeline::new(
            captures,
            faces.clone(),
            objects.clone(),
            memory.clone(),
            PipelineConfig::default(),
        );
        (
            pipeline,
            Rig {
                faces,
                objects,
                memory,
            },
        )
    }

    #[test]
    fn normalize_bearing_wraps_to_signed_heading() {
        assert_eq!(normalize_bearing(0), 0);
        assert_eq!(normalize_bearing(12), 12);
        assert_eq!(normalize_bearing(348), -12);
        assert_eq!(normalize_bearing(270), -90);
        assert_eq!(normalize_bearing(180), 180);
    }

    #[tokio::test]
    async fn known_face_and_object_appear_in_snapshot() {
        let (mut pipeline, rig) = rig();
        rig.memory
            .lock()
            .unwrap()
            .register("Rocky", &[1.0, 0.0, 0.0])
            .unwrap();
        rig.faces.set(vec![DetectedFace {
            rect: rect(),
            confidence: 0.92,
            encoding: vec![1.0, 0.0, 0.0],
        }]);
        rig.objects.set(vec![ObjectSighting {
            class: "cup".into(),
            rect: rect(),
            score: 0.87,
        }]);

        let snapshot = pipeline.process(capture()).await;

        assert_eq!(snapshot.faces.len(), 1);
        assert_eq!(snapshot.faces[0].name.as_deref(), Some("Rocky"));
        assert!(snapshot.faces[0].confidence >= 0.9);
        assert_eq!(snapshot.objects.len(), 1);
        assert_eq!(snapshot.objects[0].class, "cup");
        assert!((snapshot.objects[0].score - 0.87).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unknown_face_is_reported_anonymous() {
        let (mut pipeline, rig) = rig();
        rig.faces.set(vec![DetectedFace {
            rect: rect(),
            confidence: 0.8,
            encoding: vec![0.0, 0.0, 1.0],
        }]);

        let snapshot = pipeline.process(capture()).await;
        assert_eq!(snapshot.faces.len(), 1);
        assert!(snapshot.faces[0].name.is_none());
    }

    #[tokio::test]
    async fn duplicate_identity_keeps_only_best_box() {
        let (mut pipeline, rig) = rig();
        rig.memory
            .lock()
            .unwrap()
            .register("Rocky", &[1.0, 0.0, 0.0])
            .unwrap();
        rig.faces.set(vec![
            DetectedFace {
                rect: rect(),
                confidence: 0.9,
                encoding: vec![0.9, 0.3, 0.0],
            },
            DetectedFace {
                rect: rect(),
                confidence: 0.9,
                encoding: vec![1.0, 0.0, 0.0],
            },
        ]);

        let snapshot = pipeline.process(capture()).await;
        let named: Vec<_> = snapshot.faces.iter().filter(|f| f.name.is_some()).collect();
        assert_eq!(named.len(), 1, "one box per identity per frame");
        // The exact-match encoding has the higher similarity.
        assert!((named[0].confidence - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn low_score_objects_are_dropped() {
        let (mut pipeline, rig) = rig();
        rig.objects.set(vec![
            ObjectSighting {
                class: "cup".into(),
                rect: rect(),
                score: 0.87,
            },
            ObjectSighting {
                class: "maybe_sock".into(),
                rect: rect(),
                score: 0.2,
            },
        ]);

        let snapshot = pipeline.process(capture()).await;
        assert_eq!(snapshot.objects.len(), 1);
        assert_eq!(snapshot.objects[0].class, "cup");
    }

    #[tokio::test]
    async fn object_sightings_are_recorded_in_memory() {
        let (mut pipeline, rig) = rig();
        rig.objects.set(vec![ObjectSighting {
            class: "cup".into(),
            rect: rect(),
            score: 0.87,
        }]);

        pipeline.process(capture()).await;

        let history = rig
            .memory
            .lock()
            .unwrap()
            .object_history("cup", 10)
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn room_is_matched_from_scene_features() {
        let (pipeline, rig) = rig();
        rig.memory
            .lock()
            .unwrap()
            .upsert_room("kitchen", &[1.0, 0.0])
            .unwrap();
        let mut pipeline =
            pipeline.with_feature_extractor(Arc::new(StaticFeatureExtractor::new(vec![1.0, 0.0])));

        let snapshot = pipeline.process(capture()).await;
        assert_eq!(snapshot.room.as_deref(), Some("kitchen"));
    }

    #[tokio::test]
    async fn slow_scene_analyzer_omits_the_field() {
        let (pipeline, _rig) = rig();
        let mut pipeline = pipeline.with_scene_analyzer(Arc::new(
            StaticSceneAnalyzer::new("a sunny room").with_delay(Duration::from_millis(200)),
        ));
        pipeline.cfg.analysis_deadline = Duration::from_millis(20);

        let snapshot = pipeline.process(capture()).await;
        assert!(snapshot.scene_description.is_none());
    }

    #[tokio::test]
    async fn fast_scene_analyzer_fills_the_field() {
        let (pipeline, _rig) = rig();
        let mut pipeline =
            pipeline.with_scene_analyzer(Arc::new(StaticSceneAnalyzer::new("a sunny room")));

        let snapshot = pipeline.process(capture()).await;
        assert_eq!(snapshot.scene_description.as_deref(), Some("a sunny room"));
    }

    #[tokio::test]
    async fn sound_detection_produces_audio_event() {
        let (pipeline, _rig) = rig();
        let mut pipeline =
            pipeline.with_transcriber(Arc::new(StaticTranscriber::new(Some("hallo".into()))));

        let mut cap = capture();
        cap.sensors.sound_direction = Some(348);
        let snapshot = pipeline.process(cap).await;

        let audio = snapshot.audio.expect("audio event expected");
        assert_eq!(audio.transcript, "hallo");
        assert_eq!(audio.direction_deg, Some(-12));
    }

    #[tokio::test]
    async fn snapshot_sequence_is_monotonic() {
        let (mut pipeline, _rig) = rig();
        let first = pipeline.process(capture()).await;
        let second = pipeline.process(capture()).await;
        assert!(second.seq > first.seq);
        assert!(second.ts >= first.ts);
    }
}
