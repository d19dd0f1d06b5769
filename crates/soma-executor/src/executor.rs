//! [`Executor`] – serialised application of commands to the actuators.
//!
//! The executor is the only writer of [`BodyState`] and the only caller of
//! the [`Actuators`] HAL.  One async mutex per
//! [`ActuatorGroup`][soma_types::ActuatorGroup] gives the
//! concurrency contract: strict serialisation within a group, free
//! concurrency across groups (LEDs and speech do not wait for a walk).
//!
//! Combos run their steps in order; each step is validated just before it
//! executes, the first failure aborts the remainder, and the result reports
//! exactly which steps completed.  Physical actions are never retried – a
//! partially executed movement cannot be safely replayed – and an in-flight
//! command always runs to completion, even across a shutdown request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use soma_hal::Actuators;
use soma_types::{
    ActionCommand, BodyState, ComboSpec, ExecutionResult, FailedStep, HeadPose, PowerMode,
    RgbMode, RgbState, SomaError,
};
use tokio::sync::{Mutex, watch};
use tracing::{info, instrument, warn};

use crate::rules::CommandValidator;

/// The serialisation point between command sources and hardware.
pub struct Executor {
    actuators: Arc<dyn Actuators>,
    validator: CommandValidator,
    state: watch::Sender<BodyState>,
    legs: Arc<Mutex<()>>,
    head: Arc<Mutex<()>>,
    lights: Arc<Mutex<()>>,
    voice: Arc<Mutex<()>>,
    shutting_down: AtomicBool,
}

impl Executor {
    /// Build an executor over `actuators`, initialising [`BodyState`] from
    /// hardware defaults.
    pub fn new(actuators: Arc<dyn Actuators>, validator: CommandValidator) -> Self {
        let (state, _) = watch::channel(BodyState::default());
        Self {
            actuators,
            validator,
            state,
            legs: Arc::new(Mutex::new(())),
            head: Arc::new(Mutex::new(())),
            lights: Arc::new(Mutex::new(())),
            voice: Arc::new(Mutex::new(())),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Read-only snapshot of the current body state.
    pub fn state(&self) -> BodyState {
        self.state.borrow().clone()
    }

    /// Watch handle for contexts that want change notifications.
    pub fn watch_state(&self) -> watch::Receiver<BodyState> {
        self.state.subscribe()
    }

    /// Record the latest battery reading.  The executor stays the single
    /// writer of [`BodyState`]; the daemon feeds readings in from the
    /// perception side.
    pub fn record_battery(&self, volts: f32) {
        self.state.send_modify(|s| s.battery_v = Some(volts));
    }

    /// Validate and execute one command.
    ///
    /// # Errors
    ///
    /// - [`SomaError::InvalidCommand`] – rejected before hardware access.
    /// - [`SomaError::ExecutionFailure`] – hardware fault, or the executor
    ///   is shutting down.
    ///
    /// A combo whose step fails returns `Ok` with `ok = false` and the
    /// failing step named; the steps before it really ran.
    #[instrument(skip(self), fields(cmd = %command.label()))]
    pub async fn execute(&self, command: ActionCommand) -> Result<ExecutionResult, SomaError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(SomaError::ExecutionFailure {
                component: "executor".to_string(),
                detail: "shutting down".to_string(),
            });
        }
        self.validator.validate(&command)?;
        self.check_power_mode(&command)?;

        match command {
            ActionCommand::Ping => Ok(ExecutionResult::success(vec!["ping".to_string()])),
            ActionCommand::Combo(spec) => self.execute_combo(spec).await,
            primitive => {
                let label = self.apply_primitive(&primitive).await?;
                Ok(ExecutionResult::success(vec![label]))
            }
        }
    }

    /// Park the body and refuse further commands.  Waits for in-flight
    /// commands by taking every group lock before touching hardware.
    pub async fn shutdown(&self) -> Result<(), SomaError> {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _legs = self.legs.lock().await;
        let _head = self.head.lock().await;
        let _lights = self.lights.lock().await;
        let _voice = self.voice.lock().await;

        info!("parking body for shutdown");
        self.actuators.park()?;
        self.state.send_modify(|s| {
            s.mode = PowerMode::Asleep;
            s.rgb = RgbState {
                r: 0,
                g: 0,
                b: 0,
                mode: RgbMode::Solid,
                bps: 1.0,
            };
        });
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn check_power_mode(&self, command: &ActionCommand) -> Result<(), SomaError> {
        if self.state.borrow().mode == PowerMode::Asleep && command.requires_motion() {
            return Err(SomaError::invalid("body is asleep; send wake first"));
        }
        Ok(())
    }

    /// Apply a single validated primitive, holding its group lock for the
    /// duration of the physical action.
    async fn apply_primitive(&self, command: &ActionCommand) -> Result<String, SomaError> {
        let label = command.label();
        match command {
            ActionCommand::Move {
                action,
                steps,
                speed,
            } => {
                let _legs = self.legs.lock().await;
                self.actuators.perform(action, *steps, *speed)?;
            }
            ActionCommand::Head { yaw, roll, pitch } => {
                let _head = self.head.lock().await;
                self.actuators.set_head(*yaw, *roll, *pitch)?;
                self.state.send_modify(|s| {
                    s.pose = HeadPose {
                        yaw: *yaw,
                        roll: *roll,
                        pitch: *pitch,
                    }
                });
            }
            ActionCommand::Rgb {
                r,
                g,
                b,
                mode,
                bps,
            } => {
                let _lights = self.lights.lock().await;
                self.actuators.set_rgb(*r, *g, *b, *mode, *bps)?;
                self.state.send_modify(|s| {
                    s.rgb = RgbState {
                        r: *r,
                        g: *g,
                        b: *b,
                        mode: *mode,
                        bps: *bps,
                    }
                });
            }
            ActionCommand::Speak { text } => {
                let _voice = self.voice.lock().await;
                self.actuators.speak(text)?;
            }
            ActionCommand::Sound { name } => {
                let _voice = self.voice.lock().await;
                self.actuators.play_sound(name)?;
            }
            ActionCommand::Wake => {
                // Lock order across groups is fixed (legs before lights) so
                // multi-group sequences cannot deadlock each other.
                let _legs = self.legs.lock().await;
                let _lights = self.lights.lock().await;
                self.actuators.perform("stand", 1, 80)?;
                let rgb = RgbState::default();
                self.actuators.set_rgb(rgb.r, rgb.g, rgb.b, rgb.mode, rgb.bps)?;
                self.state.send_modify(|s| {
                    s.mode = PowerMode::Awake;
                    s.rgb = rgb;
                });
            }
            ActionCommand::Sleep => {
                let _legs = self.legs.lock().await;
                let _lights = self.lights.lock().await;
                self.actuators.perform("lie", 1, 60)?;
                let rgb = RgbState {
                    r: 0,
                    g: 0,
                    b: 80,
                    mode: RgbMode::Breath,
                    bps: 0.3,
                };
                self.actuators.set_rgb(rgb.r, rgb.g, rgb.b, rgb.mode, rgb.bps)?;
                self.state.send_modify(|s| {
                    s.mode = PowerMode::Asleep;
                    s.rgb = rgb;
                });
            }
            ActionCommand::Reset => {
                let _legs = self.legs.lock().await;
                let _head = self.head.lock().await;
                self.actuators.perform("stand", 1, 60)?;
                self.actuators.set_head(0.0, 0.0, 0.0)?;
                self.state.send_modify(|s| s.pose = HeadPose::default());
            }
            ActionCommand::Ping | ActionCommand::Combo(_) => {
                // Routed before apply_primitive; nothing to do here.
            }
        }
        Ok(label)
    }

    async fn execute_combo(&self, spec: ComboSpec) -> Result<ExecutionResult, SomaError> {
        // Speech addresses the voice group only, so it runs alongside the
        // motion steps rather than in sequence with them.
        let speak_handle = spec.speak.clone().map(|text| {
            let actuators = Arc::clone(&self.actuators);
            let voice = Arc::clone(&self.voice);
            tokio::spawn(async move {
                let _voice = voice.lock().await;
                actuators.speak(&text)
            })
        });

        let mut completed = Vec::new();
        let mut failed: Option<FailedStep> = None;
        for step in &spec.steps {
            let step_result = match self.validator.validate(step) {
                Ok(()) => self.apply_primitive(step).await.map(|label| {
                    completed.push(label);
                }),
                Err(e) => Err(e),
            };
            if let Err(e) = step_result {
                warn!(step = %step.label(), error = %e, "combo aborted");
                failed = Some(FailedStep {
                    step: step.label(),
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                break;
            }
        }

        if let Some(handle) = speak_handle {
            match handle.await {
                Ok(Ok(())) => completed.push("speak".to_string()),
                Ok(Err(e)) => {
                    if failed.is_none() {
                        failed = Some(FailedStep {
                            step: "speak".to_string(),
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    if failed.is_none() {
                        failed = Some(FailedStep {
                            step: "speak".to_string(),
                            kind: "execution_failure".to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        match failed {
            None => {
                self.state
                    .send_modify(|s| s.last_combo = Some(completed.join("+")));
                Ok(ExecutionResult::success(completed))
            }
            Some(failed) => Ok(ExecutionResult::aborted(completed, failed)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
