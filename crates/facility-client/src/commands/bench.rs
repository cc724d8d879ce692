//! Concurrent load test.
//!
//! Each worker owns one client (and so one socket and id counter) and runs
//! a random mix of two queries to one booking against a fixed set of
//! facilities.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use facility_core::TimeSlot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::channel::ChannelConfig;
use crate::client::FacilityClient;
use crate::error::{ClientError, ClientResult};

/// Facilities the stock server ships with.
pub const FACILITIES: [&str; 5] = [
    "Conference_Room_A",
    "Conference_Room_B",
    "Lab_101",
    "Lab_102",
    "Auditorium",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchOp {
    Query,
    Book,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Rejected,
    Timeout,
    Failed,
}

impl Outcome {
    fn of<T>(result: &ClientResult<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(ClientError::Protocol { .. }) => Self::Rejected,
            Err(ClientError::Timeout { .. }) => Self::Timeout,
            Err(_) => Self::Failed,
        }
    }
}

/// One timed request.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub op: BenchOp,
    pub latency: Duration,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchReport {
    pub workers: usize,
    pub ops_per_worker: usize,
    pub total_requests: usize,
    pub success_count: usize,
    pub rejected_count: usize,
    pub timeout_count: usize,
    pub failed_count: usize,
    /// Percentage of requests that succeeded.
    pub success_rate: f64,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub elapsed_secs: f64,
    pub throughput_rps: f64,
    pub operations: BTreeMap<BenchOp, usize>,
}

impl BenchReport {
    /// Aggregates samples. p99 falls back to the maximum below 100 samples.
    pub fn from_samples(samples: &[Sample], elapsed: Duration) -> Self {
        let mut report = Self {
            total_requests: samples.len(),
            elapsed_secs: elapsed.as_secs_f64(),
            ..Self::default()
        };
        if samples.is_empty() {
            return report;
        }

        for sample in samples {
            *report.operations.entry(sample.op).or_default() += 1;
            match sample.outcome {
                Outcome::Success => report.success_count += 1,
                Outcome::Rejected => report.rejected_count += 1,
                Outcome::Timeout => report.timeout_count += 1,
                Outcome::Failed => report.failed_count += 1,
            }
        }

        let mut latencies: Vec<f64> = samples
            .iter()
            .map(|s| s.latency.as_secs_f64() * 1_000.0)
            .collect();
        latencies.sort_by(f64::total_cmp);
        let n = latencies.len();
        let at = |q: f64| latencies[((n as f64 * q) as usize).min(n - 1)];

        report.success_rate = report.success_count as f64 / n as f64 * 100.0;
        report.min_ms = latencies[0];
        report.max_ms = latencies[n - 1];
        report.avg_ms = latencies.iter().sum::<f64>() / n as f64;
        report.p50_ms = at(0.50);
        report.p90_ms = at(0.90);
        report.p95_ms = at(0.95);
        report.p99_ms = if n > 100 { at(0.99) } else { report.max_ms };
        if report.elapsed_secs > 0.0 {
            report.throughput_rps = n as f64 / report.elapsed_secs;
        }
        report
    }
}

/// Runs `workers` concurrent clients against `server`, `ops` requests each.
pub async fn run(
    server: &str,
    config: ChannelConfig,
    workers: usize,
    ops: usize,
) -> ClientResult<BenchReport> {
    if workers == 0 {
        return Err(ClientError::Config("workers must be at least 1".into()));
    }
    info!(server, workers, ops, "starting bench");

    let started = Instant::now();
    let mut tasks = Vec::with_capacity(workers);
    for worker in 0..workers {
        let client = FacilityClient::connect(server, config.clone()).await?;
        tasks.push(tokio::spawn(run_worker(worker, client, ops)));
    }

    let mut samples = Vec::with_capacity(workers * ops);
    for task in tasks {
        samples.extend(task.await?);
    }
    let elapsed = started.elapsed();

    let mut report = BenchReport::from_samples(&samples, elapsed);
    report.workers = workers;
    report.ops_per_worker = ops;
    Ok(report)
}

async fn run_worker(worker: usize, mut client: FacilityClient, ops: usize) -> Vec<Sample> {
    let mut rng = StdRng::from_os_rng();
    let mut samples = Vec::with_capacity(ops);

    for _ in 0..ops {
        let facility = FACILITIES[rng.random_range(0..FACILITIES.len())];
        let is_query = rng.random_range(0..3) < 2;

        let sample = if is_query {
            let days: Vec<u32> = (0..rng.random_range(1..=3))
                .map(|_| rng.random_range(0..=7))
                .collect();
            let started = Instant::now();
            let result = client.query_availability(facility, &days).await;
            Sample {
                op: BenchOp::Query,
                latency: started.elapsed(),
                outcome: Outcome::of(&result),
            }
        } else {
            let slot = random_slot(&mut rng);
            let started = Instant::now();
            let result = match slot {
                Some(slot) => client.book(facility, slot).await,
                None => Err(ClientError::Config("slot out of range".into())),
            };
            Sample {
                op: BenchOp::Book,
                latency: started.elapsed(),
                outcome: Outcome::of(&result),
            }
        };
        debug!(worker, op = ?sample.op, outcome = ?sample.outcome, "bench request");
        samples.push(sample);

        let pause = Duration::from_micros(rng.random_range(1_000..=10_000));
        tokio::time::sleep(pause).await;
    }
    samples
}

/// A one to four hour slot starting within the next week.
fn random_slot(rng: &mut StdRng) -> Option<TimeSlot> {
    let now = u32::try_from(chrono::Utc::now().timestamp()).ok()?;
    let offset = rng.random_range(0..=7u32) * 86_400 + rng.random_range(0..=23u32) * 3_600;
    let hours = rng.random_range(1..=4u32);
    TimeSlot::starting_at(now.checked_add(offset)?, hours * 3_600).ok()
}

pub fn print_text(report: &BenchReport) {
    println!("Workers:        {}", report.workers);
    println!("Ops per worker: {}", report.ops_per_worker);
    println!("Requests:       {}", report.total_requests);
    println!(
        "Succeeded:      {} ({:.1}%)",
        report.success_count, report.success_rate
    );
    println!(
        "Rejected:       {}  Timed out: {}  Failed: {}",
        report.rejected_count, report.timeout_count, report.failed_count
    );
    println!(
        "Latency ms:     min {:.2}  avg {:.2}  max {:.2}",
        report.min_ms, report.avg_ms, report.max_ms
    );
    println!(
        "Percentiles ms: p50 {:.2}  p90 {:.2}  p95 {:.2}  p99 {:.2}",
        report.p50_ms, report.p90_ms, report.p95_ms, report.p99_ms
    );
    println!(
        "Throughput:     {:.1} req/s over {:.2}s",
        report.throughput_rps, report.elapsed_secs
    );
    for (op, count) in &report.operations {
        println!("  {op:?}: {count}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(op: BenchOp, ms: u64, outcome: Outcome) -> Sample {
        Sample {
            op,
            latency: Duration::from_millis(ms),
            outcome,
        }
    }

    #[test]
    fn empty_run_reports_zeros() {
        let report = BenchReport::from_samples(&[], Duration::from_secs(1));
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.success_rate, 0.0);
        assert!(report.operations.is_empty());
    }

    #[test]
    fn aggregates_outcomes_and_latencies() {
        let samples: Vec<Sample> = (1..=10)
            .map(|ms| {
                let outcome = match ms {
                    9 => Outcome::Rejected,
                    10 => Outcome::Timeout,
                    _ => Outcome::Success,
                };
                let op = if ms % 3 == 0 { BenchOp::Book } else { BenchOp::Query };
                sample(op, ms, outcome)
            })
            .collect();

        let report = BenchReport::from_samples(&samples, Duration::from_secs(2));
        assert_eq!(report.total_requests, 10);
        assert_eq!(report.success_count, 8);
        assert_eq!(report.rejected_count, 1);
        assert_eq!(report.timeout_count, 1);
        assert_eq!(report.success_rate, 80.0);
        assert_eq!(report.min_ms, 1.0);
        assert_eq!(report.max_ms, 10.0);
        assert_eq!(report.avg_ms, 5.5);
        assert_eq!(report.p50_ms, 6.0);
        assert_eq!(report.p90_ms, 10.0);
        assert_eq!(report.p99_ms, 10.0);
        assert_eq!(report.throughput_rps, 5.0);
        assert_eq!(report.operations[&BenchOp::Book], 3);
        assert_eq!(report.operations[&BenchOp::Query], 7);
    }

    #[test]
    fn outcome_classification() {
        let rejected: ClientResult<()> = Err(ClientError::Protocol {
            message: "Time slot not available".into(),
        });
        assert_eq!(Outcome::of(&rejected), Outcome::Rejected);
        assert_eq!(Outcome::of(&Ok::<_, ClientError>(1)), Outcome::Success);
    }

    #[test]
    fn random_slots_fall_within_a_week() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let slot = random_slot(&mut rng).unwrap();
            assert!(slot.duration_secs() >= 3_600 && slot.duration_secs() <= 4 * 3_600);
        }
    }
}
