//! Command line interface for the `pullstream` demo binary.
//!
//! The demo publishes synthetic messages to an in-process broker and drives
//! a subscriber policy against it.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `pullstream` binary.
#[derive(Debug, Parser)]
#[command(
    name = "pullstream",
    version,
    about = "Drive a streaming-pull subscriber against an in-process broker"
)]
pub struct Cli {
    /// Number of messages to publish.
    #[arg(short, long, default_value_t = 100)]
    pub messages: usize,
    /// Messages delivered per batch.
    #[arg(short, long, default_value_t = 10)]
    pub batch_size: usize,
    /// Callback worker threads.
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,
    /// Subscription to read from.
    #[arg(short, long, default_value = "projects/demo/subscriptions/demo")]
    pub subscription: String,
    /// Fraction of callbacks that decline and fail instead of acknowledging.
    #[arg(long, default_value_t = 0.0)]
    pub fail_rate: f64,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_defaults() {
        let cli = Cli::parse_from(["pullstream"]);
        assert_eq!(cli.messages, 100);
        assert_eq!(cli.batch_size, 10);
        assert!(cli.metrics_addr.is_none());
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from([
            "pullstream",
            "--messages",
            "5",
            "--workers",
            "2",
            "--fail-rate",
            "0.5",
            "--subscription",
            "projects/p/subscriptions/s",
        ]);
        assert_eq!(cli.messages, 5);
        assert_eq!(cli.workers, 2);
        assert!((cli.fail_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(cli.subscription, "projects/p/subscriptions/s");
    }
}
