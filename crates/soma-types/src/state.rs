//! Body state and execution reporting.
//!
//! [`BodyState`] has exactly one writer (the action executor); every other
//! context receives read-only snapshots through a watch channel.  It is
//! initialised from hardware defaults at startup and parked (sit, LEDs off)
//! on shutdown.

use serde::{Deserialize, Serialize};

use crate::command::RgbMode;

/// Absolute head pose in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f32,
    pub roll: f32,
    pub pitch: f32,
}

/// Last-applied RGB strip settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RgbState {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub mode: RgbMode,
    pub bps: f32,
}

impl Default for RgbState {
    fn default() -> Self {
        // Idle purple breathing, the body's resting colour.
        Self {
            r: 128,
            g: 0,
            b: 255,
            mode: RgbMode::Breath,
            bps: 0.8,
        }
    }
}

/// Awake/asleep mode.  Motion commands are rejected while asleep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    #[default]
    Awake,
    Asleep,
}

/// Process-wide actuator state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub pose: HeadPose,
    pub rgb: RgbState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_v: Option<f32>,
    pub mode: PowerMode,
    /// Label of the most recently completed combo, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_combo: Option<String>,
}

/// The step that aborted a command sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedStep {
    pub step: String,
    pub kind: String,
    pub message: String,
}

/// Outcome of one [`ActionCommand`][crate::ActionCommand] execution.
///
/// For a combo, `completed` lists the labels of the steps that ran to
/// completion in order; when a step fails, `ok` is `false`, `failed` names
/// the step, and the remaining steps were never started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub ok: bool,
    pub completed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<FailedStep>,
}

impl ExecutionResult {
    /// A fully-successful execution of the given step labels.
    pub fn success(completed: Vec<String>) -> Self {
        Self {
            ok: true,
            completed,
            failed: None,
        }
    }

    /// An aborted sequence: `completed` ran, `failed` did not.
    pub fn aborted(completed: Vec<String>, failed: FailedStep) -> Self {
        Self {
            ok: false,
            completed,
            failed: Some(failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_awake_at_neutral_pose() {
        let state = BodyState::default();
        assert_eq!(state.mode, PowerMode::Awake);
        assert_eq!(state.pose, HeadPose::default());
        assert!(state.battery_v.is_none());
        assert!(state.last_combo.is_none());
    }

    #[test]
    fn execution_result_success_shape() {
        let result = ExecutionResult::success(vec!["wag_tail".into()]);
        assert!(result.ok);
        assert!(result.failed.is_none());
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("failed"));
    }

    #[test]
    fn execution_result_aborted_reports_failed_step() {
        let result = ExecutionResult::aborted(
            vec!["forward".into()],
            FailedStep {
                step: "moonwalk".into(),
                kind: "invalid_command".into(),
                message: "unknown action".into(),
            },
        );
        assert!(!result.ok);
        assert_eq!(result.completed, vec!["forward".to_string()]);
        assert_eq!(result.failed.unwrap().step, "moonwalk");
    }
}
