//! `soma-executor` – the single gateway between commands and servos.
//!
//! Two independent layers, both of which a command must clear before any
//! hardware moves:
//!
//! 1. **Validation** ([`rules::CommandValidator`]): parameter ranges, action
//!    whitelists, combo shape.  Violations are rejected with
//!    [`SomaError::InvalidCommand`][soma_types::SomaError] and never touch
//!    the HAL.
//! 2. **Serialisation** ([`executor::Executor`]): one async lock per
//!    actuator group, so at most one command drives a group at any instant
//!    while disjoint groups (speech vs. gait) run concurrently.
//!
//! The executor is also the single writer of
//! [`BodyState`][soma_types::BodyState].

pub mod emotion;
pub mod executor;
pub mod rules;

pub use emotion::Emotion;
pub use executor::Executor;
pub use rules::{CommandValidator, Rule};
