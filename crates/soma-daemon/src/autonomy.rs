//! Local reactions while the brain is unreachable.
//!
//! Active only in
//! [`LinkState::AutonomousFallback`][soma_bridge::LinkState]: the body still
//! acknowledges touch, orients toward sounds, and protects its battery, so a
//! dropped link never leaves it frozen.  Reactions go through the same
//! executor as brain commands – validation and per-group serialisation
//! apply to reflexes too.

use std::sync::Arc;

use soma_bridge::LinkState;
use soma_executor::{Emotion, Executor};
use soma_perception::cell::LatestReader;
use soma_perception::pipeline::normalize_bearing;
use soma_types::{ActionCommand, PerceptionSnapshot};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How far the head turns toward a sound, capped well inside the yaw limit.
const SOUND_TURN_LIMIT_DEG: f32 = 45.0;

/// Tuning for the reaction loop.
#[derive(Debug, Clone)]
pub struct AutonomyConfig {
    /// Battery voltage that triggers the lie-down warning.
    pub battery_low: f32,
}

/// The fallback reaction loop.
pub struct Autonomy {
    snapshots: LatestReader<PerceptionSnapshot>,
    link: watch::Receiver<LinkState>,
    executor: Arc<Executor>,
    cfg: AutonomyConfig,
    battery_warned: bool,
    last_seq: u64,
}

impl Autonomy {
    pub fn new(
        snapshots: LatestReader<PerceptionSnapshot>,
        link: watch::Receiver<LinkState>,
        executor: Arc<Executor>,
        cfg: AutonomyConfig,
    ) -> Self {
        Self {
            snapshots,
            link,
            executor,
            cfg,
            battery_warned: false,
            last_seq: 0,
        }
    }

    /// React to snapshots until the perception side goes away.
    pub async fn run(mut self) {
        let mut snapshots = self.snapshots.clone();
        loop {
            if snapshots.changed().await.is_err() {
                break;
            }
            let Some(snapshot) = snapshots.latest() else {
                continue;
            };
            if snapshot.seq <= self.last_seq {
                continue;
            }
            self.last_seq = snapshot.seq;

            if *self.link.borrow() != LinkState::AutonomousFallback {
                continue;
            }
            self.react(&snapshot).await;
        }
    }

    async fn react(&mut self, snapshot: &PerceptionSnapshot) {
        self.check_battery(snapshot).await;

        if snapshot.sensors.touch.is_touched() {
            info!(touch = ?snapshot.sensors.touch, "touch reaction");
            self.express(Emotion::Happy, None).await;
        }

        if let Some(raw) = snapshot.sensors.sound_direction {
            self.orient_to_sound(raw).await;
        }
    }

    async fn check_battery(&mut self, snapshot: &PerceptionSnapshot) {
        let Some(volts) = snapshot.sensors.battery_v else {
            return;
        };
        if volts < self.cfg.battery_low && !self.battery_warned {
            warn!(volts, "battery low, lying down");
            self.battery_warned = true;
            self.express(Emotion::Sad, Some("Battery low. I need a charge.".to_string()))
                .await;
        } else if volts >= self.cfg.battery_low + 0.2 {
            // Hysteresis: re-arm only once the voltage has clearly recovered.
            self.battery_warned = false;
        }
    }

    async fn orient_to_sound(&self, raw_bearing: u16) {
        let heading = normalize_bearing(raw_bearing) as f32;
        let yaw = heading.clamp(-SOUND_TURN_LIMIT_DEG, SOUND_TURN_LIMIT_DEG);
        info!(raw_bearing, yaw, "orienting toward sound");

        let turn = ActionCommand::Head {
            yaw,
            roll: 0.0,
            pitch: -5.0,
        };
        if let Err(e) = self.executor.execute(turn).await {
            debug!(error = %e, "sound orientation rejected");
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        let _ = self
            .executor
            .execute(ActionCommand::Head {
                yaw: 0.0,
                roll: 0.0,
                pitch: 0.0,
            })
            .await;
    }

    async fn express(&self, emotion: Emotion, speak: Option<String>) {
        if let Err(e) = self.executor.execute(emotion.expression(speak)).await {
            debug!(error = %e, "reaction rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use soma_executor::CommandValidator;
    use soma_hal::SimBody;
    use soma_perception::cell::LatestCell;
    use soma_types::{SensorReadings, TouchState};
    use std::time::Duration;

    fn snapshot(seq: u64, sensors: SensorReadings) -> PerceptionSnapshot {
        PerceptionSnapshot {
            seq,
            ts: Utc::now(),
            faces: vec![],
            objects: vec![],
            room: None,
            scene_description: None,
            audio: None,
            sensors,
        }
    }

    struct Rig {
        sim: SimBody,
        cell: LatestCell<PerceptionSnapshot>,
        link: watch::Sender<LinkState>,
    }

    fn spawn_autonomy(initial: LinkState) -> Rig {
        let sim = SimBody::new();
        let executor = Arc::new(Executor::new(
            Arc::new(sim.clone()),
            CommandValidator::with_defaults(),
        ));
        let cell = LatestCell::new();
        let (link_tx, link_rx) = watch::channel(initial);
        let autonomy = Autonomy::new(
            cell.subscribe(),
            link_rx,
            executor,
            AutonomyConfig { battery_low: 6.8 },
        );
        tokio::spawn(autonomy.run());
        Rig {
            sim,
            cell,
            link: link_tx,
        }
    }

    async fn wait_for_call(sim: &SimBody, needle: &str) -> bool {
        for _ in 0..50 {
            if sim.calls().iter().any(|c| c.contains(needle)) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn touch_triggers_happy_reaction_in_fallback() {
        let rig = spawn_autonomy(LinkState::AutonomousFallback);
        rig.cell.publish(
            1,
            snapshot(
                1,
                SensorReadings {
                    touch: TouchState::Left,
                    battery_v: Some(8.0),
                    ..SensorReadings::default()
                },
            ),
        );
        assert!(wait_for_call(&rig.sim, "perform:wag_tail").await);
    }

    #[tokio::test]
    async fn no_reactions_while_bridge_is_primary() {
        let rig = spawn_autonomy(LinkState::BridgePrimary);
        rig.cell.publish(
            1,
            snapshot(
                1,
                SensorReadings {
                    touch: TouchState::Left,
                    ..SensorReadings::default()
                },
            ),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rig.sim.calls().is_empty());
    }

    #[tokio::test]
    async fn sound_turns_head_toward_source_and_recentres() {
        let rig = spawn_autonomy(LinkState::AutonomousFallback);
        rig.cell.publish(
            1,
            snapshot(
                1,
                SensorReadings {
                    sound_direction: Some(348),
                    battery_v: Some(8.0),
                    ..SensorReadings::default()
                },
            ),
        );
        // 348° normalises to −12°, within the turn limit.
        assert!(wait_for_call(&rig.sim, "head:-12/0/-5").await);
        assert!(wait_for_call(&rig.sim, "head:0/0/0").await);
    }

    #[tokio::test]
    async fn far_sound_is_clamped_to_turn_limit() {
        let rig = spawn_autonomy(LinkState::AutonomousFallback);
        rig.cell.publish(
            1,
            snapshot(
                1,
                SensorReadings {
                    sound_direction: Some(270),
                    battery_v: Some(8.0),
                    ..SensorReadings::default()
                },
            ),
        );
        // 270° → −90°, clamped to −45°.
        assert!(wait_for_call(&rig.sim, "head:-45/0/-5").await);
    }

    #[tokio::test]
    async fn low_battery_reaction_fires_once_per_episode() {
        let rig = spawn_autonomy(LinkState::AutonomousFallback);
        let low = SensorReadings {
            battery_v: Some(6.5),
            ..SensorReadings::default()
        };
        rig.cell.publish(1, snapshot(1, low.clone()));
        assert!(wait_for_call(&rig.sim, "perform:lie").await);

        // Still low: no second warning.
        rig.cell.publish(2, snapshot(2, low));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let lies = rig
            .sim
            .calls()
            .iter()
            .filter(|c| c.contains("perform:lie"))
            .count();
        assert_eq!(lies, 1);

        // Recovered, then low again: warning re-arms.
        rig.cell.publish(
            3,
            snapshot(
                3,
                SensorReadings {
                    battery_v: Some(7.5),
                    ..SensorReadings::default()
                },
            ),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        rig.cell.publish(
            4,
            snapshot(
                4,
                SensorReadings {
                    battery_v: Some(6.4),
                    ..SensorReadings::default()
                },
            ),
        );
        for _ in 0..50 {
            let lies = rig
                .sim
                .calls()
                .iter()
                .filter(|c| c.contains("perform:lie"))
                .count();
            if lies == 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("low-battery reaction did not re-arm");
    }

    #[tokio::test]
    async fn reactions_start_after_degradation() {
        let rig = spawn_autonomy(LinkState::BridgePrimary);
        rig.cell.publish(
            1,
            snapshot(
                1,
                SensorReadings {
                    touch: TouchState::Right,
                    ..SensorReadings::default()
                },
            ),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rig.sim.calls().is_empty());

        rig.link.send(LinkState::AutonomousFallback).unwrap();
        rig.cell.publish(
            2,
            snapshot(
                2,
                SensorReadings {
                    touch: TouchState::Right,
                    ..SensorReadings::default()
                },
            ),
        );
        assert!(wait_for_call(&rig.sim, "perform:wag_tail").await);
    }
}
