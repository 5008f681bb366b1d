// Fixed-rate control loop with an input watchdog.
//
// The watchdog matters here more than on a wheeled base: if teleop dies
// mid-walk the controller must not keep integrating the last stick sample,
// so stale input degrades to a neutral pad (stand still, keep balance).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::bus::DynamixelBus;
use crate::config::{LOOP_HZ, PAD_TIMEOUT, TOPIC_CMD_PAD, TOPIC_RT_STATE};
use crate::gait::{Hexapod, TickOutcome};
use crate::messages::{ControllerReport, GamepadState, PadHealth};

/// Tracks the freshest gamepad sample and its age.
struct PadTracker {
    latest: Option<GamepadState>,
    received_at: Instant,
    health: PadHealth,
}

impl PadTracker {
    fn new() -> Self {
        Self {
            latest: None,
            received_at: Instant::now(),
            health: PadHealth::Stale, // Stale until the first sample
        }
    }

    fn on_sample(&mut self, pad: GamepadState) {
        self.latest = Some(pad);
        self.received_at = Instant::now();
    }

    /// The pad state the controller should act on this tick: the latest
    /// sample if fresh, the neutral pad otherwise.
    fn current(&mut self) -> GamepadState {
        let age = self.received_at.elapsed();
        match self.latest {
            Some(pad) if age <= PAD_TIMEOUT => {
                self.health = PadHealth::Ok;
                pad
            }
            Some(_) => {
                if self.health != PadHealth::Stale {
                    warn!("pad input stale ({:?} old), holding position", age);
                }
                self.health = PadHealth::Stale;
                GamepadState::default()
            }
            None => {
                self.health = PadHealth::Stale;
                GamepadState::default()
            }
        }
    }
}

pub async fn run(
    port: &str,
    leg_set_size: usize,
) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let subscriber = session.declare_subscriber(TOPIC_CMD_PAD).await?;
    let pub_state = session.declare_publisher(TOPIC_RT_STATE).await?;

    info!("Opening servo bus on {}", port);
    let bus = DynamixelBus::open(port)?;

    // Termination signals request a graceful sit-down; the flag is polled
    // at the top of every tick.
    let halt = Arc::new(AtomicBool::new(false));
    {
        let halt = halt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("termination signal received, requesting stop");
                halt.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut hexapod = Hexapod::new(bus, halt, leg_set_size)?;
    let mut tracker = PadTracker::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms pad timeout",
        LOOP_HZ,
        PAD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_PAD);
    info!("Publishing to: {}", TOPIC_RT_STATE);

    loop {
        tick.tick().await;

        // Drain all pending samples (non-blocking), keep the latest.
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<GamepadState>(&payload) {
                Ok(pad) => tracker.on_sample(pad),
                Err(e) => warn!("Failed to parse pad sample: {}", e),
            }
        }

        let pad = tracker.current();
        let outcome = hexapod.tick(&pad)?;

        let report = ControllerReport {
            state: hexapod.state().to_string(),
            pad: tracker.health,
        };
        pub_state.put(serde_json::to_string(&report)?).await?;

        if let TickOutcome::Finished { exit_code } = outcome {
            info!("controller halted, exiting");
            return Ok(exit_code);
        }
    }
}
