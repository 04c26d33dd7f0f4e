//! Demo binary driving a `pullstream` policy against an in-process broker.
//!
//! Publishes synthetic messages, acknowledges them from a callback and
//! prints a summary once every message has been settled.

mod cli;

use std::{
    error::Error,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use pullstream::{
    channel::MemoryChannel,
    config::PolicyConfig,
    policy::Policy,
    types::{PubsubMessage, ReceivedMessage},
};
use rand::Rng;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<(), Box<dyn Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    if !(0.0..=1.0).contains(&cli.fail_rate) {
        return Err(format!("--fail-rate must be within [0, 1], got {}", cli.fail_rate).into());
    }
    install_metrics(&cli)?;

    let channel = MemoryChannel::new();
    let policy = Policy::builder(channel.clone(), cli.subscription.as_str())
        .config(PolicyConfig {
            executor_workers: cli.workers,
            ..PolicyConfig::default()
        })
        .build()?;

    let acked = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let future = {
        let (acked, failed) = (Arc::clone(&acked), Arc::clone(&failed));
        let fail_rate = cli.fail_rate;
        policy.open(move |message| {
            if rand::rng().random_bool(fail_rate) {
                message.decline();
                failed.fetch_add(1, Ordering::SeqCst);
                return Err(format!("simulated failure for {}", message.message_id()).into());
            }
            message.acknowledge();
            acked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })?
    };

    let started = Instant::now();
    let ids: Vec<usize> = (0..cli.messages).collect();
    for chunk in ids.chunks(cli.batch_size.max(1)) {
        channel.publish_batch(chunk.iter().map(|i| {
            ReceivedMessage::new(
                format!("ack-{i}"),
                PubsubMessage::new(format!("message {i}"), i.to_string())
                    .with_attribute("source", "demo"),
            )
        }));
    }

    let settled = || acked.load(Ordering::SeqCst) + failed.load(Ordering::SeqCst);
    while settled() < cli.messages && started.elapsed() < SETTLE_TIMEOUT {
        thread::sleep(Duration::from_millis(5));
    }
    policy.close();
    future.result(Some(Duration::from_secs(5)))?;

    println!(
        "subscription {}: {} acknowledged, {} declined, {} written to stream in {:?}",
        policy.subscription(),
        acked.load(Ordering::SeqCst),
        failed.load(Ordering::SeqCst),
        channel.acknowledged().len(),
        started.elapsed()
    );
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics(cli: &cli::Cli) -> Result<(), Box<dyn Error>> {
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        log::info!("serving metrics: addr={addr}");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(cli: &cli::Cli) -> Result<(), Box<dyn Error>> {
    if cli.metrics_addr.is_some() {
        log::warn!("--metrics-addr ignored: built without the metrics feature");
    }
    Ok(())
}
