//! Emotion → expression mapping.
//!
//! Each [`Emotion`] lowers to a concrete [`ComboSpec`]: gait steps, an LED
//! mood, and optionally a head pose, taken from the expression table the
//! robot ships with.  The autonomy reactions use these; the brain can send
//! the same combos explicitly.

use std::str::FromStr;

use soma_types::{ActionCommand, ComboSpec, RgbMode, SomaError};

/// The emotions the body knows how to express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Happy,
    Sad,
    Curious,
    Excited,
    Alert,
    Sleepy,
    Angry,
    Love,
    Think,
}

impl Emotion {
    /// Lower the emotion to an executable combo, optionally speaking `text`
    /// while the expression plays.
    pub fn expression(self, speak: Option<String>) -> ActionCommand {
        let mut steps: Vec<ActionCommand> = Vec::new();

        let moves: &[&str] = match self {
            Emotion::Happy | Emotion::Love => &["wag_tail"],
            Emotion::Sad => &["lie"],
            Emotion::Excited => &["wag_tail", "bark"],
            Emotion::Alert => &["stand"],
            Emotion::Sleepy => &["doze_off"],
            Emotion::Angry => &["bark"],
            Emotion::Curious | Emotion::Think => &[],
        };
        for action in moves {
            steps.push(ActionCommand::Move {
                action: (*action).to_string(),
                steps: 3,
                speed: 80,
            });
        }

        if let Some((yaw, roll, pitch)) = match self {
            Emotion::Curious => Some((20.0, 0.0, -10.0)),
            Emotion::Think => Some((15.0, -10.0, 10.0)),
            _ => None,
        } {
            steps.push(ActionCommand::Head { yaw, roll, pitch });
        }

        let (r, g, b, mode, bps) = match self {
            Emotion::Happy => (0, 255, 0, RgbMode::Breath, 1.5),
            Emotion::Sad => (0, 0, 128, RgbMode::Breath, 0.3),
            Emotion::Curious => (0, 255, 255, RgbMode::Breath, 1.0),
            Emotion::Excited => (255, 255, 0, RgbMode::Boom, 2.0),
            Emotion::Alert => (255, 100, 0, RgbMode::Boom, 1.5),
            Emotion::Sleepy => (0, 0, 80, RgbMode::Breath, 0.3),
            Emotion::Angry => (255, 0, 0, RgbMode::Boom, 2.0),
            Emotion::Love => (255, 50, 150, RgbMode::Breath, 1.0),
            Emotion::Think => (128, 0, 255, RgbMode::Breath, 0.8),
        };
        steps.push(ActionCommand::Rgb { r, g, b, mode, bps });

        ActionCommand::Combo(ComboSpec { steps, speak })
    }
}

impl FromStr for Emotion {
    type Err = SomaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "happy" => Ok(Emotion::Happy),
            "sad" => Ok(Emotion::Sad),
            "curious" => Ok(Emotion::Curious),
            "excited" => Ok(Emotion::Excited),
            "alert" => Ok(Emotion::Alert),
            "sleepy" => Ok(Emotion::Sleepy),
            "angry" => Ok(Emotion::Angry),
            "love" => Ok(Emotion::Love),
            "think" => Ok(Emotion::Think),
            other => Err(SomaError::invalid(format!("unknown emotion '{other}'"))),
        }
    }
}
