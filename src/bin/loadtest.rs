//! Load generator for a running banner-stat server.
//!
//! Fires counter and stats requests concurrently and prints latency and
//! throughput per endpoint.

use banner_stat::types::TIME_FORMAT;
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

#[derive(Parser)]
#[command(name = "banner-stat-loadtest", about = "Load test the banner-stat service")]
struct Cli {
    /// Base URL of the service
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,
    /// Number of requests per endpoint
    #[arg(long, default_value_t = 1000)]
    requests: usize,
    /// Maximum requests in flight
    #[arg(long, default_value_t = 10)]
    concurrency: usize,
    /// Banner ID to test
    #[arg(long, default_value_t = 5)]
    banner: i64,
}

/// Outcome of one request: latency on success.
type Sample = Result<Duration, String>;

#[derive(Debug, Default)]
struct Report {
    total: usize,
    succeeded: usize,
    failed: usize,
    min: Option<Duration>,
    max: Duration,
    avg: Duration,
    rps: f64,
}

impl Report {
    fn from_samples(samples: &[Sample], elapsed: Duration) -> Self {
        let mut report = Report {
            total: samples.len(),
            ..Report::default()
        };
        let mut sum = Duration::ZERO;

        for sample in samples {
            match sample {
                Ok(latency) => {
                    report.succeeded += 1;
                    sum += *latency;
                    report.min = Some(report.min.map_or(*latency, |m| m.min(*latency)));
                    report.max = report.max.max(*latency);
                }
                Err(_) => report.failed += 1,
            }
        }

        if report.succeeded > 0 {
            report.avg = sum / report.succeeded as u32;
            report.rps = report.succeeded as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        }
        report
    }

    fn print(&self, title: &str) {
        println!("\n{title}:");
        println!("Total Requests: {}", self.total);
        println!("Successful Requests: {}", self.succeeded);
        println!("Failed Requests: {}", self.failed);
        println!("RPS: {:.2}", self.rps);
        println!("Min Latency: {:?}", self.min.unwrap_or_default());
        println!("Max Latency: {:?}", self.max);
        println!("Average Latency: {:?}", self.avg);
    }
}

async fn timed(request: reqwest::RequestBuilder) -> Sample {
    let start = Instant::now();
    match request.send().await {
        Ok(resp) if resp.status().is_success() => Ok(start.elapsed()),
        Ok(resp) => Err(format!("status {}", resp.status())),
        Err(e) => Err(e.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banner_stat_loadtest=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let permits = Arc::new(Semaphore::new(cli.concurrency.max(1)));
    let counter_url = format!("{}/counter/{}", cli.url, cli.banner);
    let stats_url = format!("{}/stats/{}", cli.url, cli.banner);

    let started = Instant::now();

    let clicks = (0..cli.requests).map(|_| {
        let permits = permits.clone();
        let request = client.post(&counter_url);
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|e| e.to_string())?;
            timed(request).await
        })
    });
    let stats = (0..cli.requests).map(|_| {
        let permits = permits.clone();
        let now = chrono::Utc::now().naive_utc();
        let body = serde_json::json!({
            "from": (now - chrono::Duration::hours(1)).format(TIME_FORMAT).to_string(),
            "to": now.format(TIME_FORMAT).to_string(),
        });
        let request = client.post(&stats_url).json(&body);
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|e| e.to_string())?;
            timed(request).await
        })
    });

    let (clicks, stats) = futures::future::join(
        futures::future::join_all(clicks.collect::<Vec<_>>()),
        futures::future::join_all(stats.collect::<Vec<_>>()),
    )
    .await;
    let elapsed = started.elapsed();

    let flatten = |results: Vec<Result<Sample, tokio::task::JoinError>>| -> Vec<Sample> {
        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|e| Err(e.to_string())))
            .inspect(|s| {
                if let Err(e) = s {
                    tracing::warn!(error = %e, "request failed");
                }
            })
            .collect()
    };

    Report::from_samples(&flatten(clicks), elapsed).print("Click Endpoint Results");
    Report::from_samples(&flatten(stats), elapsed).print("Stats Endpoint Results");
    println!("\nTotal Test Duration: {elapsed:?}");
    Ok(())
}
