//! [`SimBody`] – in-process simulated hardware for headless tests and CI.
//!
//! The sim records every actuator call, returns scripted sensor values, and
//! can be told to fail specific calls so degradation paths are testable.
//! Clone it freely – all clones share one interior state, so a test can hold
//! a handle for scripting while the capture loop and executor hold their own.
//!
//! # Example
//!
//! ```rust
//! use soma_hal::{Actuators, SensorSuite, SimBody};
//!
//! let sim = SimBody::new();
//! sim.set_battery(7.8);
//!
//! sim.perform("wag_tail", 3, 80).unwrap();
//! assert_eq!(sim.calls(), vec!["perform:wag_tail".to_string()]);
//! assert!((sim.read_battery().unwrap() - 7.8).abs() < f32::EPSILON);
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use soma_types::{Frame, RgbMode, SomaError, TouchState};

use crate::actuators::Actuators;
use crate::sensors::SensorSuite;

struct SimInner {
    // Scripted sensor values
    frame: Frame,
    touch: TouchState,
    battery_v: f32,
    pitch: f32,
    roll: f32,
    sound_direction: Option<u16>,
    // Call recording and fault injection
    calls: Vec<String>,
    fail_calls: HashSet<String>,
    fail_sensors: HashSet<String>,
    parked: bool,
}

/// Simulated body implementing both halves of the hardware contract.
#[derive(Clone)]
pub struct SimBody {
    inner: Arc<Mutex<SimInner>>,
}

impl SimBody {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                frame: Frame {
                    width: 640,
                    height: 480,
                    data: vec![0u8; 16],
                },
                touch: TouchState::None,
                battery_v: 8.2,
                pitch: 0.0,
                roll: 0.0,
                sound_direction: None,
                calls: Vec::new(),
                fail_calls: HashSet::new(),
                fail_sensors: HashSet::new(),
                parked: false,
            })),
        }
    }

    // ── Test scripting ───────────────────────────────────────────────────

    pub fn set_frame(&self, frame: Frame) {
        self.inner.lock().unwrap().frame = frame;
    }

    pub fn set_touch(&self, touch: TouchState) {
        self.inner.lock().unwrap().touch = touch;
    }

    pub fn set_battery(&self, volts: f32) {
        self.inner.lock().unwrap().battery_v = volts;
    }

    pub fn set_imu(&self, pitch: f32, roll: f32) {
        let mut inner = self.inner.lock().unwrap();
        inner.pitch = pitch;
        inner.roll = roll;
    }

    pub fn set_sound_direction(&self, bearing: Option<u16>) {
        self.inner.lock().unwrap().sound_direction = bearing;
    }

    /// Make the actuator call with the given label fail until cleared
    /// (labels are the strings recorded by [`SimBody::calls`]).
    pub fn fail_call(&self, label: &str) {
        self.inner.lock().unwrap().fail_calls.insert(label.to_string());
    }

    /// Make the named sensor (`frame`, `touch`, `battery`, `imu`, `sound`)
    /// fail until cleared.
    pub fn fail_sensor(&self, sensor: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_sensors
            .insert(sensor.to_string());
    }

    /// Clear a previously injected sensor fault.
    pub fn restore_sensor(&self, sensor: &str) {
        self.inner.lock().unwrap().fail_sensors.remove(sensor);
    }

    /// Actuator calls recorded so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// `true` after [`Actuators::park`] has run.
    pub fn is_parked(&self) -> bool {
        self.inner.lock().unwrap().parked
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn record(&self, label: String) -> Result<(), SomaError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_calls.contains(&label) {
            return Err(SomaError::ExecutionFailure {
                component: label,
                detail: "injected fault".to_string(),
            });
        }
        inner.calls.push(label);
        Ok(())
    }

    fn sensor_guard(&self, sensor: &str) -> Result<(), SomaError> {
        if self.inner.lock().unwrap().fail_sensors.contains(sensor) {
            return Err(SomaError::SensorUnavailable {
                sensor: sensor.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SimBody {
    fn default() -> Self {
        Self::new()
    }
}

impl Actuators for SimBody {
    fn perform(&self, action: &str, _steps: u8, _speed: u8) -> Result<(), SomaError> {
        self.record(format!("perform:{action}"))
    }

    fn set_head(&self, yaw: f32, roll: f32, pitch: f32) -> Result<(), SomaError> {
        self.record(format!("head:{yaw}/{roll}/{pitch}"))
    }

    fn set_rgb(&self, r: u8, g: u8, b: u8, _mode: RgbMode, _bps: f32) -> Result<(), SomaError> {
        self.record(format!("rgb:{r}/{g}/{b}"))
    }

    fn speak(&self, text: &str) -> Result<(), SomaError> {
        self.record(format!("speak:{text}"))
    }

    fn play_sound(&self, name: &str) -> Result<(), SomaError> {
        self.record(format!("sound:{name}"))
    }

    fn park(&self) -> Result<(), SomaError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("park".to_string());
        inner.parked = true;
        Ok(())
    }
}

impl SensorSuite for SimBody {
    fn capture_frame(&self) -> Result<Frame, SomaError> {
        self.sensor_guard("frame")?;
        Ok(self.inner.lock().unwrap().frame.clone())
    }

    fn read_touch(&self) -> Result<TouchState, SomaError> {
        self.sensor_guard("touch")?;
        Ok(self.inner.lock().unwrap().touch)
    }

    fn read_battery(&self) -> Result<f32, SomaError> {
        self.sensor_guard("battery")?;
        Ok(self.inner.lock().unwrap().battery_v)
    }

    fn read_imu(&self) -> Result<(f32, f32), SomaError> {
        self.sensor_guard("imu")?;
        let inner = self.inner.lock().unwrap();
        Ok((inner.pitch, inner.roll))
    }

    fn read_sound_direction(&self) -> Result<Option<u16>, SomaError> {
        self.sensor_guard("sound")?;
        // A detection is consumed by the read, like the real sensor.
        Ok(self.inner.lock().unwrap().sound_direction.take())
    }
}
