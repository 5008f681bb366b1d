use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hexapod_zenoh_runtime::config;

#[derive(Parser)]
#[command(name = "hexapod-zenoh-runtime", about = "Gait controller for a six-legged walker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk: drive the gait loop against a serial servo bus
    Run {
        /// Serial device the servo bus is attached to
        #[arg(long, default_value = config::DEFAULT_PORT)]
        port: String,

        /// Legs per stepping group: 1, 2 (opposite pairs) or 3 (tripod)
        #[arg(long, default_value_t = config::LEG_SET_SIZE)]
        leg_set_size: usize,
    },
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { port, leg_set_size } => {
            match hexapod_zenoh_runtime::runtime::run(&port, leg_set_size).await {
                Ok(exit_code) => std::process::exit(exit_code),
                Err(e) => {
                    eprintln!("Runtime error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
