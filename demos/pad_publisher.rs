// Keyboard teleop: WASD move, Z/X rotate, R/F body height, L lift boost,
// B brace toggle, Enter stop (sit down), Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use hexapod_zenoh_runtime::config::TOPIC_CMD_PAD;
use hexapod_zenoh_runtime::messages::GamepadState;

const INPUT_TIMEOUT_MS: u64 = 100; // Release axes after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_PAD).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=body height, L=lift boost");
    info!("          B=brace toggle, Enter=stop (sit down), Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut pad = GamepadState::default();
    let mut brace = false;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - update axes and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        pad.left_y = -127;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        pad.left_y = 127;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        pad.left_x = -127;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        pad.left_x = 127;
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        pad.right_x = -127;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        pad.right_x = 127;
                        last_movement_input = Instant::now();
                    }

                    // Body height
                    KeyCode::Char('r') if pressed => {
                        pad.dpad_up = true;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('f') if pressed => {
                        pad.dpad_down = true;
                        last_movement_input = Instant::now();
                    }

                    // Extra foot lift while held
                    KeyCode::Char('l') if pressed => {
                        pad.lift_trigger = 255;
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('b') if pressed => {
                        brace = !brace;
                        info!("Brace: {}", if brace { "ON" } else { "OFF" });
                    }

                    // Ask the controller to sit down and halt
                    KeyCode::Enter if pressed => {
                        pad.start = true;
                    }

                    // Quit the publisher (the controller's watchdog takes over)
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Release axes if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            pad = GamepadState {
                start: pad.start,
                ..GamepadState::default()
            };
        }
        pad.brace = brace;

        // Always publish at ~50Hz
        publisher.put(serde_json::to_string(&pad)?).await?;
    }

    Ok(())
}
