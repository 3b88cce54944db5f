//! Feeds generated metrics through the aggregator and prints both views.

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use voxlink::kernel::telemetry::mock::generate_mock_metrics;
use voxlink::kernel::telemetry::{KindRegistry, MetricsAggregator, RAW_WINDOW_CAPACITY};
use voxlink::kernel::time::now;

#[derive(Parser, Debug)]
#[command(name = "timeline_demo", version, about = "Print the raw view and timeline built from mock metrics")]
struct Cli {
    /// Seed for the mock generator; the same seed yields the same traffic.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Candidate metrics messages to generate, three seconds apart.
    #[arg(long, default_value_t = 20)]
    events: usize,

    /// Raw events the aggregator retains.
    #[arg(long, default_value_t = RAW_WINDOW_CAPACITY)]
    window: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut aggregator = MetricsAggregator::with_capacity(KindRegistry::default(), cli.window);
    for (at, bag) in generate_mock_metrics(&mut rng, now(), cli.events) {
        aggregator.ingest_at(&bag, at);
    }
    tracing::info!(seed = cli.seed, retained = aggregator.window_len(), "mock metrics ingested");

    println!(
        "{}",
        serde_json::to_string_pretty(&aggregator.raw_view()).context("encoding raw view")?
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&aggregator.timeline_view()).context("encoding timeline")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["timeline_demo"]).unwrap();
        assert_eq!(cli.seed, 7);
        assert_eq!(cli.events, 20);
        assert_eq!(cli.window, RAW_WINDOW_CAPACITY);
    }

    #[test]
    fn test_seed_and_events_flags() {
        let cli = Cli::try_parse_from(["timeline_demo", "--seed", "3", "--events", "5", "--window", "2"]).unwrap();
        assert_eq!(cli.seed, 3);
        assert_eq!(cli.events, 5);
        assert_eq!(cli.window, 2);
    }

    #[test]
    fn test_bad_input_is_rejected() {
        let err = Cli::try_parse_from(["timeline_demo", "--events", "many"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        let err = Cli::try_parse_from(["timeline_demo", "7", "20"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);

        let err = Cli::try_parse_from(["timeline_demo", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }
}
