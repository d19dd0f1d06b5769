//! [`CaptureLoop`] – the one context that owns the camera and body sensors.
//!
//! Produces a fresh frame + sensor-reading tuple at a fixed cadence and
//! publishes it into a [`LatestCell`], independent of whether anyone is
//! reading.  A transient sensor failure degrades that field for the cycle; a
//! sensor that keeps failing past the threshold is marked unavailable and not
//! retried again inside this loop.  A frame-capture failure skips the cycle
//! entirely (there is nothing for the pipeline to chew on without a frame).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use soma_hal::SensorSuite;
use soma_types::{Frame, SensorReadings, SomaError};
use tracing::{debug, warn};

use crate::cell::{LatestCell, LatestReader};

/// One capture cycle's output: the raw frame plus the sensor readings taken
/// alongside it.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub ts: DateTime<Utc>,
    pub frame: Frame,
    pub sensors: SensorReadings,
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-sensor failure gate
// ─────────────────────────────────────────────────────────────────────────────

struct FailureGate {
    sensor: &'static str,
    threshold: u32,
    consecutive_failures: u32,
    unavailable: bool,
}

impl FailureGate {
    fn new(sensor: &'static str, threshold: u32) -> Self {
        Self {
            sensor,
            threshold,
            consecutive_failures: 0,
            unavailable: false,
        }
    }

    /// Run one read through the gate.  Returns `None` when the sensor is
    /// (or just became) unavailable, or when this read failed.
    fn read<T>(&mut self, read: impl FnOnce() -> Result<T, SomaError>) -> Option<T> {
        if self.unavailable {
            return None;
        }
        match read() {
            Ok(value) => {
                self.consecutive_failures = 0;
                Some(value)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.threshold {
                    self.unavailable = true;
                    warn!(sensor = self.sensor, error = %e, "sensor marked unavailable");
                } else {
                    debug!(sensor = self.sensor, error = %e, "sensor read failed");
                }
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CaptureLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the [`SensorSuite`] and drives the fixed-cadence capture cycle.
pub struct CaptureLoop {
    suite: Arc<dyn SensorSuite>,
    interval: Duration,
    cell: LatestCell<RawCapture>,
    seq: u64,
    frame_gate: FailureGate,
    touch_gate: FailureGate,
    battery_gate: FailureGate,
    imu_gate: FailureGate,
    sound_gate: FailureGate,
}

impl CaptureLoop {
    pub fn new(suite: Arc<dyn SensorSuite>, interval: Duration, fail_threshold: u32) -> Self {
        Self {
            suite,
            interval,
            cell: LatestCell::new(),
            seq: 0,
            frame_gate: FailureGate::new("frame", fail_threshold),
            touch_gate: FailureGate::new("touch", fail_threshold),
            battery_gate: FailureGate::new("battery", fail_threshold),
            imu_gate: FailureGate::new("imu", fail_threshold),
            sound_gate: FailureGate::new("sound", fail_threshold),
        }
    }

    /// Read handle onto the capture cell.  Take before calling `run`.
    pub fn subscribe(&self) -> LatestReader<RawCapture> {
        self.cell.subscribe()
    }

    /// Run the capture cadence until the task is dropped.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            self.cycle();
        }
    }

    /// One capture cycle.  Returns `true` when a capture was published.
    /// Split out of `run` so tests drive cycles without a clock.
    pub fn cycle(&mut self) -> bool {
        let suite = Arc::clone(&self.suite);
        let Some(frame) = self.frame_gate.read(|| suite.capture_frame()) else {
            return false;
        };

        let touch = self
            .touch_gate
            .read(|| suite.read_touch())
            .unwrap_or_default();
        let battery_v = self.battery_gate.read(|| suite.read_battery());
        let imu = self.imu_gate.read(|| suite.read_imu());
        let sound_direction = self
            .sound_gate
            .read(|| suite.read_sound_direction())
            .flatten();

        let capture = RawCapture {
            ts: Utc::now(),
            frame,
            sensors: SensorReadings {
                touch,
                battery_v,
                pitch: imu.map(|(pitch, _)| pitch),
                roll: imu.map(|(_, roll)| roll),
                sound_direction,
            },
        };

        self.seq += 1;
        self.cell.publish(self.seq, capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soma_hal::SimBody;
    use soma_types::TouchState;

    fn capture_loop(sim: &SimBody, threshold: u32) -> CaptureLoop {
        CaptureLoop::new(
            Arc::new(sim.clone()),
            Duration::from_millis(50),
            threshold,
        )
    }

    #[test]
    fn cycle_publishes_frame_and_sensors() {
        let sim = SimBody::new();
        sim.set_touch(TouchState::Left);
        sim.set_battery(7.5);
        sim.set_imu(2.0, -1.0);

        let mut cap = capture_loop(&sim, 3);
        let reader = cap.subscribe();
        assert!(cap.cycle());

        let capture = reader.latest().unwrap();
        assert_eq!(capture.sensors.touch, TouchState::Left);
        assert_eq!(capture.sensors.battery_v, Some(7.5));
        assert_eq!(capture.sensors.pitch, Some(2.0));
        assert_eq!(capture.sensors.roll, Some(-1.0));
    }

    #[test]
    fn frame_failure_skips_the_cycle() {
        let sim = SimBody::new();
        sim.fail_sensor("frame");
        let mut cap = capture_loop(&sim, 3);
        let reader = cap.subscribe();

        assert!(!cap.cycle());
        assert!(reader.latest().is_none());
    }

    #[test]
    fn transient_failure_degrades_field_then_recovers() {
        let sim = SimBody::new();
        let mut cap = capture_loop(&sim, 3);
        let reader = cap.subscribe();

        sim.fail_sensor("battery");
        cap.cycle();
        assert!(reader.latest().unwrap().sensors.battery_v.is_none());

        // Recovery before the threshold resets the failure count.
        sim.restore_sensor("battery");
        cap.cycle();
        assert!(reader.latest().unwrap().sensors.battery_v.is_some());
    }

    #[test]
    fn repeated_failures_mark_sensor_unavailable() {
        let sim = SimBody::new();
        let mut cap = capture_loop(&sim, 3);
        let reader = cap.subscribe();

        sim.fail_sensor("battery");
        for _ in 0..3 {
            cap.cycle();
        }

        // Even after the fault clears, the gate no longer retries.
        sim.restore_sensor("battery");
        cap.cycle();
        assert!(reader.latest().unwrap().sensors.battery_v.is_none());
    }

    #[test]
    fn capture_sequence_is_monotonic() {
        let sim = SimBody::new();
        let mut cap = capture_loop(&sim, 3);
        let reader = cap.subscribe();

        cap.cycle();
        let first = reader.latest_seq().unwrap();
        cap.cycle();
        let second = reader.latest_seq().unwrap();
        assert!(second > first);
    }
}
