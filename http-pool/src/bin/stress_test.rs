//! Floods a target host with pooled requests and reports throughput and
//! connection-reuse stats. Build with `--features stress-test`.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use http_pool::{Config, Dispatcher, HostPort, Priority, Request};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stress-test", about = "Flood a host with pooled requests")]
struct Args {
    /// Target endpoint, `host:port`.
    #[arg(long)]
    target: String,
    /// Number of requests to send.
    #[arg(long, default_value_t = 100)]
    requests: usize,
    /// Number of worker threads.
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let host: HostPort = args
        .target
        .parse()
        .with_context(|| format!("Invalid target `{}`", args.target))?;

    let config = Config {
        workers: args.workers,
        ..Config::default()
    };
    let dispatcher = Dispatcher::tcp(config)?;

    let payload = format!(
        "GET / HTTP/1.1\r\nHost: {}\r\nConnection: keep-alive\r\n\r\n",
        host.host
    )
    .into_bytes();

    let (sender, receiver) = mpsc::channel();
    let started = Instant::now();
    for i in 0..args.requests {
        let priority = match i % 3 {
            0 => Priority::Low,
            1 => Priority::Normal,
            _ => Priority::High,
        };
        let sender = sender.clone();
        dispatcher.submit(Request::new(
            host.clone(),
            payload.clone(),
            priority,
            move |outcome| {
                let _ = sender.send(outcome.is_ok());
            },
        ));
    }
    drop(sender);

    let mut ok = 0usize;
    let mut failed = 0usize;
    while let Ok(success) = receiver.recv() {
        if success {
            ok += 1;
        } else {
            failed += 1;
        }
    }

    let elapsed = started.elapsed();
    println!(
        "{} requests in {:.2?} ({:.0} req/s): {} ok, {} failed, {} connection(s) left idle",
        args.requests,
        elapsed,
        args.requests as f64 / elapsed.as_secs_f64(),
        ok,
        failed,
        dispatcher.idle_connections()
    );

    if !dispatcher.shutdown(Duration::from_secs(10)) {
        anyhow::bail!("pool did not drain within 10s");
    }
    Ok(())
}
