//! Perception data model: frames, sightings, sensor readings, snapshots.
//!
//! A [`PerceptionSnapshot`] is produced once per processed camera frame and
//! is immutable after publication.  Only the most recent snapshot is kept in
//! the hot path; history survives only through memory-store writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw camera frame (encoded JPEG bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// One detected face: box, optional identity, and match confidence.
///
/// `name` is `None` for anonymous sightings (no match above the face
/// threshold); those are eligible for registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSighting {
    pub rect: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub confidence: f32,
}

/// One detected object above the score threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSighting {
    pub class: String,
    pub rect: BoundingBox,
    pub score: f32,
}

/// A locally-captured voice event awaiting the brain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEvent {
    pub id: Uuid,
    pub transcript: String,
    /// Signed bearing in degrees: 0 = dead ahead, negative = left.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_deg: Option<i32>,
    pub ts: DateTime<Utc>,
}

impl AudioEvent {
    pub fn new(transcript: impl Into<String>, direction_deg: Option<i32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript: transcript.into(),
            direction_deg,
            ts: Utc::now(),
        }
    }
}

/// Dual-touch sensor state, using the original sensor alphabet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TouchState {
    #[default]
    #[serde(rename = "N")]
    None,
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
    #[serde(rename = "LS")]
    SlideLeft,
    #[serde(rename = "RS")]
    SlideRight,
}

impl TouchState {
    pub fn is_touched(self) -> bool {
        self != TouchState::None
    }
}

/// Non-camera sensor readings for one capture cycle.
///
/// Each field is `None` when its sensor is degraded (see the capture loop's
/// failure policy); absent fields never fail a perception cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    #[serde(default)]
    pub touch: TouchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_v: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f32>,
    /// Raw sound-direction bearing (0–360°) when a sound was detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_direction: Option<u16>,
}

/// The structured result of one perception cycle.
///
/// `seq` and `ts` are strictly monotonic across published snapshots; a
/// reader never observes an older snapshot after a newer one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    pub seq: u64,
    pub ts: DateTime<Utc>,
    pub faces: Vec<FaceSighting>,
    pub objects: Vec<ObjectSighting>,
    /// Best room match from the spatial memory, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Free-text description from the deep scene analyzer; omitted whenever
    /// the analyzer missed the cycle deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioEvent>,
    pub sensors: SensorReadings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_state_uses_sensor_alphabet() {
        assert_eq!(serde_json::to_string(&TouchState::Left).unwrap(), "\"L\"");
        assert_eq!(
            serde_json::from_str::<TouchState>("\"RS\"").unwrap(),
            TouchState::SlideRight
        );
        assert!(!TouchState::None.is_touched());
        assert!(TouchState::SlideLeft.is_touched());
    }

    #[test]
    fn snapshot_omits_absent_optional_fields() {
        let snap = PerceptionSnapshot {
            seq: 1,
            ts: Utc::now(),
            faces: vec![],
            objects: vec![],
            room: None,
            scene_description: None,
            audio: None,
            sensors: SensorReadings::default(),
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(!json.contains("scene_description"));
        assert!(!json.contains("room"));
        assert!(!json.contains("audio"));
    }

    #[test]
    fn snapshot_roundtrip_with_sightings() {
        let snap = PerceptionSnapshot {
            seq: 7,
            ts: Utc::now(),
            faces: vec![FaceSighting {
                rect: BoundingBox {
                    x: 10.0,
                    y: 20.0,
                    w: 64.0,
                    h: 64.0,
                },
                name: Some("Rocky".into()),
                confidence: 0.92,
            }],
            objects: vec![ObjectSighting {
                class: "cup".into(),
                rect: BoundingBox {
                    x: 100.0,
                    y: 80.0,
                    w: 40.0,
                    h: 50.0,
                },
                score: 0.87,
            }],
            room: Some("living_room".into()),
            scene_description: None,
            audio: None,
            sensors: SensorReadings {
                touch: TouchState::None,
                battery_v: Some(7.9),
                pitch: Some(0.5),
                roll: Some(-0.2),
                sound_direction: None,
            },
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: PerceptionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
