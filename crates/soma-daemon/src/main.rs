//! `somad` – the always-on body daemon.
//!
//! Wires the whole stack together and keeps it alive:
//!
//! 1. Sensor capture loop (owns camera + body sensors)
//! 2. Perception pipeline (detectors + memory store → snapshots)
//! 3. Action executor (single writer of body state)
//! 4. Bridge API + fallback transport (brain-facing surfaces)
//! 5. Link monitor + autonomy reactions (degradation handling)
//!
//! Ctrl-C parks the body (sit, LEDs off) before exit.

mod autonomy;
mod config;
mod telemetry;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use soma_bridge::{
    AppState, BridgeServer, FallbackServer, LinkMonitor, SecurityConfig, SecurityLayer, VoiceInbox,
};
use soma_executor::{CommandValidator, Executor};
use soma_hal::SimBody;
use soma_memory::{MemoryConfig, MemoryStore};
use soma_perception::analyzer::RemoteSceneAnalyzer;
use soma_perception::capture::CaptureLoop;
use soma_perception::detect::{FaceDetector, StaticFaceDetector, StaticObjectDetector};
use soma_perception::pipeline::{Pipeline, PipelineConfig};
use tracing::{error, info, warn};

use crate::autonomy::{Autonomy, AutonomyConfig};

#[tokio::main]
async fn main() {
    let _telemetry = telemetry::init_tracing("soma");

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            info!(path = %config::config_path().display(), "config loaded");
            cfg
        }
        Ok(None) => {
            info!("no config file, using defaults");
            config::Config::default()
        }
        Err(e) => {
            warn!(error = %e, "config unreadable, using defaults");
            config::Config::default()
        }
    };

    // ── Memory store ──────────────────────────────────────────────────────
    let memory_cfg = MemoryConfig {
        face_match: cfg.face_match,
        face_collide: cfg.face_collide,
        room_match: cfg.room_match,
        object_retention: cfg.object_retention,
        ..MemoryConfig::default()
    };
    let db_path = cfg.memory_db_path();
    let memory = match MemoryStore::open(&db_path.to_string_lossy(), memory_cfg.clone()) {
        Ok(store) => {
            info!(path = %db_path.display(), "memory store opened");
            store
        }
        Err(e) => {
            warn!(error = %e, "persistent memory unavailable, falling back to in-memory (data will be lost)");
            match MemoryStore::open_in_memory(memory_cfg) {
                Ok(store) => store,
                Err(e) => {
                    error!(error = %e, "cannot initialise memory store");
                    return;
                }
            }
        }
    };
    let memory = Arc::new(Mutex::new(memory));

    // ── Hardware + executor ───────────────────────────────────────────────
    // Real robots plug their driver in behind the HAL traits; the simulated
    // body keeps the daemon runnable on any machine.
    let body = SimBody::new();
    let executor = Arc::new(Executor::new(
        Arc::new(body.clone()),
        CommandValidator::with_defaults(),
    ));

    // ── Capture loop ──────────────────────────────────────────────────────
    let capture = CaptureLoop::new(
        Arc::new(body.clone()),
        Duration::from_millis(cfg.capture_interval_ms),
        cfg.sensor_fail_threshold,
    );
    let captures = capture.subscribe();
    tokio::spawn(capture.run());

    // ── Perception pipeline ───────────────────────────────────────────────
    // Detector model wrappers implement FaceDetector/ObjectDetector; the
    // scripted doubles stand in until a model backend is wired up.
    let face_detector: Arc<dyn FaceDetector> = Arc::new(StaticFaceDetector::new());
    let mut pipeline = Pipeline::new(
        captures.clone(),
        face_detector.clone(),
        Arc::new(StaticObjectDetector::new()),
        memory.clone(),
        PipelineConfig {
            object_score: cfg.object_score,
            analysis_deadline: Duration::from_millis(cfg.analysis_deadline_ms),
        },
    );
    if !cfg.scene_analyzer_url.is_empty() {
        info!(url = %cfg.scene_analyzer_url, "remote scene analyzer enabled");
        pipeline =
            pipeline.with_scene_analyzer(Arc::new(RemoteSceneAnalyzer::new(&cfg.scene_analyzer_url)));
    }
    let snapshots = pipeline.subscribe();
    tokio::spawn(pipeline.run());

    // ── Link monitor ──────────────────────────────────────────────────────
    let link = LinkMonitor::new(
        Duration::from_millis(cfg.probe_window_ms),
        Duration::from_millis(cfg.probe_interval_ms),
    );
    tokio::spawn(link.clone().run());

    // ── Snapshot feed: battery into body state, audio into the inbox ──────
    let inbox = VoiceInbox::new(32);
    {
        let mut snapshots = snapshots.clone();
        let executor = executor.clone();
        let inbox = inbox.clone();
        tokio::spawn(async move {
            let mut last_audio = None;
            while snapshots.changed().await.is_ok() {
                let Some(snapshot) = snapshots.latest() else {
                    continue;
                };
                if let Some(volts) = snapshot.sensors.battery_v {
                    executor.record_battery(volts);
                }
                if let Some(audio) = snapshot.audio
                    && last_audio != Some(audio.id)
                {
                    last_audio = Some(audio.id);
                    inbox.push(audio);
                }
            }
        });
    }

    // ── Autonomy reactions ────────────────────────────────────────────────
    tokio::spawn(
        Autonomy::new(
            snapshots.clone(),
            link.subscribe(),
            executor.clone(),
            AutonomyConfig {
                battery_low: cfg.battery_low,
            },
        )
        .run(),
    );

    // ── Fallback transport ────────────────────────────────────────────────
    {
        let fallback = FallbackServer::new(executor.clone()).with_port(cfg.fallback_port);
        tokio::spawn(async move {
            if let Err(e) = fallback.run().await {
                error!(error = %e, "fallback transport stopped");
            }
        });
    }

    // ── Bridge API ────────────────────────────────────────────────────────
    let state = AppState {
        executor: executor.clone(),
        snapshots,
        captures,
        memory,
        face_detector,
        inbox,
        link,
        security: Arc::new(SecurityLayer::new(SecurityConfig {
            token: (!cfg.api_token.is_empty()).then(|| cfg.api_token.clone()),
            rate_limit_per_min: cfg.rate_limit_per_min,
        })),
    };
    let server = BridgeServer::new(state)
        .with_host(cfg.bridge_host.clone())
        .with_port(cfg.bridge_port);

    info!(
        bridge = %format!("{}:{}", cfg.bridge_host, cfg.bridge_port),
        fallback_port = cfg.fallback_port,
        "somad up"
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "bridge server stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }

    // ── Teardown: park the body, never leave servos energised ─────────────
    if let Err(e) = executor.shutdown().await {
        warn!(error = %e, "body park failed during shutdown");
    }
    info!("somad down");
}
