//! The command vocabulary accepted by the body.
//!
//! [`ActionCommand`] is a closed, internally-tagged enum: the wire shape is
//! `{"cmd": "move", "action": "forward", ...}`, matching what the remote
//! brain sends over both the HTTP bridge and the line-delimited fallback
//! transport.  Arbitrary per-kind JSON fields are rejected at deserialisation
//! time rather than carried around as untyped maps.
//!
//! Each primitive command addresses exactly one [`ActuatorGroup`]; the
//! executor serialises commands within a group and lets disjoint groups run
//! concurrently (speech and LEDs do not wait for a walk to finish).

use serde::{Deserialize, Serialize};

/// LED animation modes understood by the RGB strip firmware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RgbMode {
    Solid,
    #[default]
    Breath,
    Boom,
    Bark,
    Speak,
    Listen,
}

/// The mutually-exclusive actuator partitions of the body.
///
/// Commands touching different groups may execute concurrently; commands
/// within one group are strictly serialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorGroup {
    /// Gait/posture servos (also owns wake/sleep/reset sequences).
    Legs,
    /// Head yaw/roll/pitch servos.
    Head,
    /// RGB LED strip.
    Lights,
    /// Speaker: TTS and sound effects.
    Voice,
}

/// An ordered sequence of primitive sub-commands executed as one logical
/// unit, with optional speech that runs concurrently on the voice group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboSpec {
    /// Primitive steps, executed in order.  A failing step aborts the rest.
    pub steps: Vec<ActionCommand>,
    /// Spoken concurrently with the steps (disjoint actuator group).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak: Option<String>,
}

/// A single command from the brain, discriminated by `cmd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ActionCommand {
    /// Execute a named gait or posture (e.g. `forward`, `sit`, `wag_tail`).
    Move {
        action: String,
        #[serde(default = "default_steps")]
        steps: u8,
        #[serde(default = "default_speed")]
        speed: u8,
    },
    /// Move the head to absolute angles (degrees).
    Head {
        #[serde(default)]
        yaw: f32,
        #[serde(default)]
        roll: f32,
        #[serde(default)]
        pitch: f32,
    },
    /// Set the RGB strip colour and animation.
    Rgb {
        r: u8,
        g: u8,
        b: u8,
        #[serde(default)]
        mode: RgbMode,
        #[serde(default = "default_bps")]
        bps: f32,
    },
    /// Speak text through the TTS voice.
    Speak { text: String },
    /// Play a built-in sound effect.
    Sound { name: String },
    /// Wake-up sequence: stand, restore LEDs.
    Wake,
    /// Sleep sequence: lie down, dim LEDs; motion rejected until `wake`.
    Sleep,
    /// Return to the neutral standing pose.
    Reset,
    /// No-op liveness check; touches no hardware.
    Ping,
    /// An ordered sequence of primitives reported as one unit.
    Combo(ComboSpec),
}

fn default_steps() -> u8 {
    3
}

fn default_speed() -> u8 {
    80
}

fn default_bps() -> f32 {
    1.0
}

impl ActionCommand {
    /// The actuator group this primitive addresses.
    ///
    /// Returns `None` for [`ActionCommand::Ping`] (no hardware) and
    /// [`ActionCommand::Combo`] (spans the groups of its steps).
    pub fn group(&self) -> Option<ActuatorGroup> {
        match self {
            ActionCommand::Move { .. }
            | ActionCommand::Wake
            | ActionCommand::Sleep
            | ActionCommand::Reset => Some(ActuatorGroup::Legs),
            ActionCommand::Head { .. } => Some(ActuatorGroup::Head),
            ActionCommand::Rgb { .. } => Some(ActuatorGroup::Lights),
            ActionCommand::Speak { .. } | ActionCommand::Sound { .. } => {
                Some(ActuatorGroup::Voice)
            }
            ActionCommand::Ping | ActionCommand::Combo(_) => None,
        }
    }

    /// Short human-readable label used in execution reports and logs.
    pub fn label(&self) -> String {
        match self {
            ActionCommand::Move { action, .. } => action.clone(),
            ActionCommand::Head { .. } => "head".to_string(),
            ActionCommand::Rgb { .. } => "rgb".to_string(),
            ActionCommand::Speak { .. } => "speak".to_string(),
            ActionCommand::Sound { name } => format!("sound:{name}"),
            ActionCommand::Wake => "wake".to_string(),
            ActionCommand::Sleep => "sleep".to_string(),
            ActionCommand::Reset => "reset".to_string(),
            ActionCommand::Ping => "ping".to_string(),
            ActionCommand::Combo(_) => "combo".to_string(),
        }
    }

    /// `true` for commands that drive posture/gait servos and are therefore
    /// rejected while the body is asleep.
    pub fn requires_motion(&self) -> bool {
        matches!(
            self,
            ActionCommand::Move { .. }
                | ActionCommand::Head { .. }
                | ActionCommand::Reset
                | ActionCommand::Combo(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_wire_shape_matches_brain_protocol() {
        let json = r#"{"cmd":"move","action":"forward","steps":2,"speed":70}"#;
        let cmd: ActionCommand = serde_json::from_str(json).unwrap();
        match cmd {
            ActionCommand::Move {
                action,
                steps,
                speed,
            } => {
                assert_eq!(action, "forward");
                assert_eq!(steps, 2);
                assert_eq!(speed, 70);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn move_defaults_applied_when_omitted() {
        let cmd: ActionCommand = serde_json::from_str(r#"{"cmd":"move","action":"sit"}"#).unwrap();
        assert!(matches!(
            cmd,
            ActionCommand::Move {
                steps: 3,
                speed: 80,
                ..
            }
        ));
    }

    #[test]
    fn unit_commands_roundtrip() {
        for cmd in [
            ActionCommand::Wake,
            ActionCommand::Sleep,
            ActionCommand::Reset,
            ActionCommand::Ping,
        ] {
            let json = serde_json::to_string(&cmd).unwrap();
            let back: ActionCommand = serde_json::from_str(&json).unwrap();
            assert_eq!(cmd, back);
        }
    }

    #[test]
    fn combo_wire_shape() {
        let json = r#"{"cmd":"combo","steps":[{"cmd":"move","action":"wag_tail"},{"cmd":"rgb","r":0,"g":255,"b":0}],"speak":"hello"}"#;
        let cmd: ActionCommand = serde_json::from_str(json).unwrap();
        let ActionCommand::Combo(spec) = cmd else {
            panic!("expected combo");
        };
        assert_eq!(spec.steps.len(), 2);
        assert_eq!(spec.speak.as_deref(), Some("hello"));
    }

    #[test]
    fn unknown_cmd_is_rejected() {
        let result = serde_json::from_str::<ActionCommand>(r#"{"cmd":"self_destruct"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn groups_partition_the_vocabulary() {
        assert_eq!(
            ActionCommand::Head {
                yaw: 0.0,
                roll: 0.0,
                pitch: 0.0
            }
            .group(),
            Some(ActuatorGroup::Head)
        );
        assert_eq!(
            ActionCommand::Speak { text: "hi".into() }.group(),
            Some(ActuatorGroup::Voice)
        );
        assert_eq!(ActionCommand::Sleep.group(), Some(ActuatorGroup::Legs));
        assert_eq!(ActionCommand::Ping.group(), None);
    }

    #[test]
    fn motion_gating_covers_posture_commands() {
        assert!(
            ActionCommand::Move {
                action: "forward".into(),
                steps: 3,
                speed: 80
            }
            .requires_motion()
        );
        assert!(!ActionCommand::Wake.requires_motion());
        assert!(
            !ActionCommand::Rgb {
                r: 0,
                g: 0,
                b: 0,
                mode: RgbMode::Breath,
                bps: 1.0
            }
            .requires_motion()
        );
    }
}
