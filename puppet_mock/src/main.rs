//! Puppet Mock Simulator CLI
//!
//! Populates a mocker, lets it chatter and reports the traffic it saw.

use clap::Parser;
use puppet_mock::{run, RunMode, SimConfig, SimulationReport};
use std::time::{Duration, TryFromFloatSecsError};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Puppet Mock simulation CLI
#[derive(Parser, Debug)]
#[command(name = "puppet-mock-sim")]
#[command(about = "Run a simulated chat universe and report its traffic", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of contacts to create
    #[arg(short, long, default_value = "10")]
    contacts: usize,

    /// Number of rooms to create
    #[arg(short, long, default_value = "3")]
    rooms: usize,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: f64,

    /// Chatter period in milliseconds
    #[arg(short, long, default_value = "1000")]
    interval_ms: u64,

    /// Logged-in user answers every n-th incoming message (0 = never)
    #[arg(long, default_value = "5")]
    reply_every: usize,

    /// Run on the wall clock instead of a stepped virtual clock
    #[arg(long)]
    realtime: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Fails on a negative, infinite or NaN `--duration`.
    fn config(&self, seed: u64) -> Result<SimConfig, TryFromFloatSecsError> {
        Ok(SimConfig {
            seed,
            contacts: self.contacts,
            rooms: self.rooms,
            duration: Duration::try_from_secs_f64(self.duration)?,
            interval: Duration::from_millis(self.interval_ms),
            reply_every: self.reply_every,
            mode: if self.realtime {
                RunMode::Realtime
            } else {
                RunMode::Virtual
            },
            ..Default::default()
        })
    }
}

fn print_summary(report: &SimulationReport) {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("Seed:               {}", report.seed);
    info!("Ticks:              {}", report.ticks);
    info!("Contacts / rooms:   {} / {}", report.contacts, report.rooms);
    info!("Messages stored:    {}", report.messages_stored);
    info!("Message events:     {}", report.message_events);
    info!("  mobile originated {}", report.mobile_originated);
    info!("  mobile terminated {}", report.mobile_terminated);
    if report.lagged > 0 {
        info!("Events lost (lag):  {}", report.lagged);
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    if !args.json {
        info!("Puppet Mock Simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    // Determine seed
    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let config = match args.config(seed) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid --duration {}: {}", args.duration, e);
            std::process::exit(1);
        }
    };

    let report = match run(&config).await {
        Ok(report) => report,
        Err(e) => {
            error!("Simulation failed: {}", e);
            std::process::exit(1);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to encode report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print_summary(&report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let argv = std::iter::once("puppet-mock-sim").chain(extra.iter().copied());
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_fractional_duration() {
        let config = args(&["--duration", "1.5", "--realtime"]).config(7).unwrap();
        assert_eq!(config.duration, Duration::from_millis(1500));
        assert_eq!(config.mode, RunMode::Realtime);
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_unrepresentable_duration_is_an_error() {
        assert!(args(&["--duration", "inf"]).config(1).is_err());
        assert!(args(&["--duration", "NaN"]).config(1).is_err());
        assert!(args(&["--duration", "1e30"]).config(1).is_err());
        assert!(args(&["--duration=-1"]).config(1).is_err());
    }
}
