//! [`CommandValidator`] – parameter validation rule engine.
//!
//! Every inbound [`ActionCommand`] passes through the validator before the
//! executor touches hardware.  Rules are evaluated in insertion order; the
//! first violation wins and is returned as
//! [`SomaError::InvalidCommand`].  Combo steps are shape-checked here and
//! individually re-validated by the executor as each step comes up, so a bad
//! third step surfaces only after the first two have run.
//!
//! # Example
//!
//! ```
//! use soma_executor::CommandValidator;
//! use soma_types::ActionCommand;
//!
//! let validator = CommandValidator::with_defaults();
//!
//! let nod = ActionCommand::Move { action: "nod".into(), steps: 2, speed: 70 };
//! assert!(validator.validate(&nod).is_ok());
//!
//! let wild = ActionCommand::Head { yaw: 200.0, roll: 0.0, pitch: 0.0 };
//! assert!(validator.validate(&wild).is_err());
//! ```

use soma_hal::actions;
use soma_types::{ActionCommand, SomaError};

/// Mechanical head-angle limits in degrees.
pub const YAW_RANGE: (f32, f32) = (-80.0, 80.0);
pub const ROLL_RANGE: (f32, f32) = (-30.0, 30.0);
pub const PITCH_RANGE: (f32, f32) = (-30.0, 30.0);

/// Longest accepted TTS utterance.
pub const MAX_TEXT_LEN: usize = 500;

/// Most steps a single combo may carry.
pub const MAX_COMBO_STEPS: usize = 16;

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single validation invariant a command must satisfy.
pub trait Rule: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &str;

    /// `Ok(())` when the command satisfies the invariant.
    fn check(&self, command: &ActionCommand) -> Result<(), SomaError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Rejects head poses outside the servo's mechanical range.
pub struct HeadLimits;

impl Rule for HeadLimits {
    fn name(&self) -> &str {
        "head_limits"
    }

    fn check(&self, command: &ActionCommand) -> Result<(), SomaError> {
        if let ActionCommand::Head { yaw, roll, pitch } = command {
            for (field, value, (lo, hi)) in [
                ("yaw", *yaw, YAW_RANGE),
                ("roll", *roll, ROLL_RANGE),
                ("pitch", *pitch, PITCH_RANGE),
            ] {
                if !value.is_finite() || value < lo || value > hi {
                    return Err(SomaError::invalid(format!(
                        "head.{field} {value} out of [{lo}, {hi}]"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Rejects unknown gait names and out-of-range step/speed values.
pub struct MoveLimits;

impl Rule for MoveLimits {
    fn name(&self) -> &str {
        "move_limits"
    }

    fn check(&self, command: &ActionCommand) -> Result<(), SomaError> {
        if let ActionCommand::Move {
            action,
            steps,
            speed,
        } = command
        {
            if !actions::is_move_action(action) {
                return Err(SomaError::invalid(format!("unknown action '{action}'")));
            }
            if !(1..=10).contains(steps) {
                return Err(SomaError::invalid(format!("steps {steps} out of [1, 10]")));
            }
            if !(1..=100).contains(speed) {
                return Err(SomaError::invalid(format!(
                    "speed {speed} out of [1, 100]"
                )));
            }
        }
        Ok(())
    }
}

/// Rejects LED animations with a nonsensical blink rate.
pub struct RgbLimits;

impl Rule for RgbLimits {
    fn name(&self) -> &str {
        "rgb_limits"
    }

    fn check(&self, command: &ActionCommand) -> Result<(), SomaError> {
        if let ActionCommand::Rgb { bps, .. } = command
            && (!bps.is_finite() || *bps < 0.1 || *bps > 5.0)
        {
            return Err(SomaError::invalid(format!("rgb.bps {bps} out of [0.1, 5]")));
        }
        Ok(())
    }
}

/// Rejects empty, oversized, or control-character-laden speech.
pub struct SpeechLimits;

impl Rule for SpeechLimits {
    fn name(&self) -> &str {
        "speech_limits"
    }

    fn check(&self, command: &ActionCommand) -> Result<(), SomaError> {
        let text = match command {
            ActionCommand::Speak { text } => text.as_str(),
            ActionCommand::Combo(spec) => match &spec.speak {
                Some(text) => text.as_str(),
                None => return Ok(()),
            },
            _ => return Ok(()),
        };
        check_text(text)
    }
}

fn check_text(text: &str) -> Result<(), SomaError> {
    if text.trim().is_empty() {
        return Err(SomaError::invalid("text must not be empty"));
    }
    if text.len() > MAX_TEXT_LEN {
        return Err(SomaError::invalid(format!(
            "text too long ({} > {MAX_TEXT_LEN})",
            text.len()
        )));
    }
    if text.chars().any(|c| c.is_control() && c != '\n') {
        return Err(SomaError::invalid("text contains control characters"));
    }
    Ok(())
}

/// Rejects sound effects the speaker firmware does not ship.
pub struct SoundWhitelist;

impl Rule for SoundWhitelist {
    fn name(&self) -> &str {
        "sound_whitelist"
    }

    fn check(&self, command: &ActionCommand) -> Result<(), SomaError> {
        if let ActionCommand::Sound { name } = command
            && !actions::is_sound_name(name)
        {
            return Err(SomaError::invalid(format!("unknown sound '{name}'")));
        }
        Ok(())
    }
}

/// Shape check for combos: bounded step count, no nesting.
pub struct ComboShape;

impl Rule for ComboShape {
    fn name(&self) -> &str {
        "combo_shape"
    }

    fn check(&self, command: &ActionCommand) -> Result<(), SomaError> {
        if let ActionCommand::Combo(spec) = command {
            if spec.steps.is_empty() && spec.speak.is_none() {
                return Err(SomaError::invalid("combo must carry steps or speech"));
            }
            if spec.steps.len() > MAX_COMBO_STEPS {
                return Err(SomaError::invalid(format!(
                    "combo has {} steps, max {MAX_COMBO_STEPS}",
                    spec.steps.len()
                )));
            }
            if spec
                .steps
                .iter()
                .any(|s| matches!(s, ActionCommand::Combo(_)))
            {
                return Err(SomaError::invalid("combos cannot nest"));
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CommandValidator
// ────────────────────────────────────────────────────────────────────────────

/// Rule engine applied to every command before it reaches hardware.
#[derive(Default)]
pub struct CommandValidator {
    rules: Vec<Box<dyn Rule>>,
}

impl CommandValidator {
    /// An empty validator with no rules (accepts everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator carrying all built-in rules.
    pub fn with_defaults() -> Self {
        let mut validator = Self::new();
        validator.add_rule(Box::new(MoveLimits));
        validator.add_rule(Box::new(HeadLimits));
        validator.add_rule(Box::new(RgbLimits));
        validator.add_rule(Box::new(SpeechLimits));
        validator.add_rule(Box::new(SoundWhitelist));
        validator.add_rule(Box::new(ComboShape));
        validator
    }

    /// Register a rule.  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Validate `command` against every rule; first violation wins.
    pub fn validate(&self, command: &ActionCommand) -> Result<(), SomaError> {
        for rule in &self.rules {
            rule.check(command)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soma_types::{ComboSpec, RgbMode};

    fn validator() -> CommandValidator {
        CommandValidator::with_defaults()
    }

    fn head(yaw: f32, roll: f32, pitch: f32) -> ActionCommand {
        ActionCommand::Head { yaw, roll, pitch }
    }

    // ── Head ─────────────────────────────────────────────────────────────

    #[test]
    fn head_within_limits_passes() {
        assert!(validator().validate(&head(10.0, 0.0, -5.0)).is_ok());
    }

    #[test]
    fn head_at_boundary_passes() {
        assert!(validator().validate(&head(80.0, -30.0, 30.0)).is_ok());
    }

    #[test]
    fn head_beyond_yaw_limit_rejected() {
        let err = validator().validate(&head(81.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, SomaError::InvalidCommand { .. }));
    }

    #[test]
    fn head_nan_rejected() {
        assert!(validator().validate(&head(f32::NAN, 0.0, 0.0)).is_err());
    }

    // ── Move ─────────────────────────────────────────────────────────────

    #[test]
    fn known_action_passes() {
        let cmd = ActionCommand::Move {
            action: "wag_tail".into(),
            steps: 5,
            speed: 80,
        };
        assert!(validator().validate(&cmd).is_ok());
    }

    #[test]
    fn unknown_action_rejected() {
        let cmd = ActionCommand::Move {
            action: "moonwalk".into(),
            steps: 3,
            speed: 80,
        };
        assert!(validator().validate(&cmd).is_err());
    }

    #[test]
    fn zero_steps_rejected() {
        let cmd = ActionCommand::Move {
            action: "forward".into(),
            steps: 0,
            speed: 80,
        };
        assert!(validator().validate(&cmd).is_err());
    }

    // ── Rgb / Speak / Sound ──────────────────────────────────────────────

    #[test]
    fn rgb_bps_out_of_range_rejected() {
        let cmd = ActionCommand::Rgb {
            r: 255,
            g: 0,
            b: 0,
            mode: RgbMode::Boom,
            bps: 9.0,
        };
        assert!(validator().validate(&cmd).is_err());
    }

    #[test]
    fn empty_speech_rejected() {
        let cmd = ActionCommand::Speak { text: "  ".into() };
        assert!(validator().validate(&cmd).is_err());
    }

    #[test]
    fn oversized_speech_rejected() {
        let cmd = ActionCommand::Speak {
            text: "a".repeat(MAX_TEXT_LEN + 1),
        };
        assert!(validator().validate(&cmd).is_err());
    }

    #[test]
    fn control_characters_rejected() {
        let cmd = ActionCommand::Speak {
            text: "hello\x07world".into(),
        };
        assert!(validator().validate(&cmd).is_err());
    }

    #[test]
    fn unknown_sound_rejected() {
        let cmd = ActionCommand::Sound {
            name: "airhorn".into(),
        };
        assert!(validator().validate(&cmd).is_err());
    }

    // ── Combo ────────────────────────────────────────────────────────────

    #[test]
    fn combo_with_steps_passes_shape_check() {
        let cmd = ActionCommand::Combo(ComboSpec {
            steps: vec![ActionCommand::Move {
                action: "wag_tail".into(),
                steps: 3,
                speed: 80,
            }],
            speak: Some("hello".into()),
        });
        assert!(validator().validate(&cmd).is_ok());
    }

    #[test]
    fn empty_combo_rejected() {
        let cmd = ActionCommand::Combo(ComboSpec {
            steps: vec![],
            speak: None,
        });
        assert!(validator().validate(&cmd).is_err());
    }

    #[test]
    fn nested_combo_rejected() {
        let inner = ComboSpec {
            steps: vec![ActionCommand::Ping],
            speak: None,
        };
        let cmd = ActionCommand::Combo(ComboSpec {
            steps: vec![ActionCommand::Combo(inner)],
            speak: None,
        });
        assert!(validator().validate(&cmd).is_err());
    }

    #[test]
    fn combo_shape_does_not_check_individual_steps() {
        // A bad step passes the boundary check; the executor surfaces it
        // when the step comes up, after earlier steps have run.
        let cmd = ActionCommand::Combo(ComboSpec {
            steps: vec![ActionCommand::Move {
                action: "moonwalk".into(),
                steps: 3,
                speed: 80,
            }],
            speak: None,
        });
        assert!(validator().validate(&cmd).is_ok());
    }

    #[test]
    fn ping_always_passes() {
        assert!(validator().validate(&ActionCommand::Ping).is_ok());
    }
}
