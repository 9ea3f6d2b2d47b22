//! Performance metrics and decision statistics for the scoring service.

use crate::error::Stage;
use crate::pipeline::ScoringOutcome;
use crate::types::assessment::{RiskClassification, RiskTier};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Counters shared by every request handler
pub struct PipelineMetrics {
    /// Requests that produced assessments
    pub requests_succeeded: AtomicU64,
    /// Requests rejected at any stage
    pub requests_failed: AtomicU64,
    /// Records scored across all successful requests
    pub records_scored: AtomicU64,
    /// Records classified `HighRisk`
    pub high_risk_decisions: AtomicU64,
    /// Successful requests that ran with unmatched canonical features
    pub degraded_requests: AtomicU64,
    failures_by_stage: RwLock<HashMap<String, u64>>,
    records_by_tier: RwLock<HashMap<String, u64>>,
    /// Canonical features that went unmatched, by name
    soft_misses: RwLock<HashMap<String, u64>>,
    /// Request latencies (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// P(default) distribution in tenths
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            requests_succeeded: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            records_scored: AtomicU64::new(0),
            high_risk_decisions: AtomicU64::new(0),
            degraded_requests: AtomicU64::new(0),
            failures_by_stage: RwLock::new(HashMap::new()),
            records_by_tier: RwLock::new(HashMap::new()),
            soft_misses: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful request
    pub fn record_outcome(&self, processing_time: Duration, outcome: &ScoringOutcome) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
        self.records_scored
            .fetch_add(outcome.assessments.len() as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let high_risk = outcome
            .assessments
            .iter()
            .filter(|a| a.classification == RiskClassification::HighRisk)
            .count();
        self.high_risk_decisions
            .fetch_add(high_risk as u64, Ordering::Relaxed);

        if let Ok(mut buckets) = self.probability_buckets.write() {
            for assessment in &outcome.assessments {
                let bucket = (assessment.probability * 10.0).clamp(0.0, 9.0) as usize;
                buckets[bucket] += 1;
            }
        }

        if let Ok(mut by_tier) = self.records_by_tier.write() {
            for assessment in &outcome.assessments {
                *by_tier
                    .entry(assessment.risk_tier.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }

        if outcome.reconciliation.is_degraded() {
            self.degraded_requests.fetch_add(1, Ordering::Relaxed);
            if let Ok(mut misses) = self.soft_misses.write() {
                for name in &outcome.reconciliation.unmatched {
                    *misses.entry(name.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    /// Record a rejected request against the stage that rejected it
    pub fn record_failure(&self, stage: Stage) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_stage) = self.failures_by_stage.write() {
            *by_stage.entry(stage.to_string()).or_insert(0) += 1;
        }
    }

    pub fn failures_for(&self, stage: Stage) -> u64 {
        self.failures_by_stage
            .read()
            .ok()
            .and_then(|by_stage| by_stage.get(&stage.to_string()).copied())
            .unwrap_or(0)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Records scored per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or_default()
    }

    pub fn get_records_by_tier(&self) -> HashMap<String, u64> {
        self.records_by_tier
            .read()
            .map(|by_tier| by_tier.clone())
            .unwrap_or_default()
    }

    /// Unmatched canonical features, most frequent first
    pub fn get_soft_misses(&self) -> Vec<(String, u64)> {
        let mut misses: Vec<(String, u64)> = self
            .soft_misses
            .read()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        misses.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        misses
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let succeeded = self.requests_succeeded.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let records = self.records_scored.load(Ordering::Relaxed);
        let high_risk = self.high_risk_decisions.load(Ordering::Relaxed);
        let degraded = self.degraded_requests.load(Ordering::Relaxed);
        let high_risk_rate = if records > 0 {
            (high_risk as f64 / records as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let by_tier = self.get_records_by_tier();
        let distribution = self.get_probability_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            CREDIT RISK SCORING - METRICS SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests: {:>8} ok {:>6} failed  │  Degraded: {:>6}      ║",
            succeeded, failed, degraded
        );
        info!(
            "║ Records Scored: {:>8}  │  Throughput: {:>6.1} rec/s        ║",
            records, throughput
        );
        info!(
            "║ High Risk:      {:>8}  │  Rate: {:>6.1}%                   ║",
            high_risk, high_risk_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}      ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Records by Risk Tier:                                        ║");
        for tier in RiskTier::ALL.map(|t| t.as_str()) {
            let count = by_tier.get(tier).copied().unwrap_or(0);
            let pct = if records > 0 {
                (count as f64 / records as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:10}: {:>6} ({:>5.1}%)                                ║", tier, count, pct);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ P(default) Distribution:                                     ║");
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        if failed > 0 {
            if let Ok(by_stage) = self.failures_by_stage.read() {
                for (stage, count) in by_stage.iter() {
                    info!(stage = %stage, failures = count, "Failures by stage");
                }
            }
        }

        let misses = self.get_soft_misses();
        if !misses.is_empty() {
            info!("Unmatched canonical features:");
            for (feature, count) in &misses {
                info!("  {}: {} requests", feature, count);
            }
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a summary every `interval_secs`
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_matcher::ReconciliationReport;
    use crate::types::assessment::RiskAssessment;

    fn assessment(probability: f64, classification: RiskClassification, tier: RiskTier) -> RiskAssessment {
        RiskAssessment {
            probability,
            classification,
            confidence: 0.5,
            risk_tier: tier,
            threshold_used: 0.42,
        }
    }

    fn outcome(unmatched: &[&str]) -> ScoringOutcome {
        ScoringOutcome {
            assessments: vec![
                assessment(0.15, RiskClassification::LowRisk, RiskTier::Low),
                assessment(0.45, RiskClassification::HighRisk, RiskTier::Medium),
                assessment(1.0, RiskClassification::HighRisk, RiskTier::High),
            ],
            reconciliation: ReconciliationReport {
                unmatched: unmatched.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            threshold_used: 0.42,
        }
    }

    #[test]
    fn test_outcome_recording() {
        let metrics = PipelineMetrics::new();
        metrics.record_outcome(Duration::from_micros(100), &outcome(&[]));
        metrics.record_outcome(Duration::from_micros(300), &outcome(&["loan_int_rate"]));

        assert_eq!(metrics.requests_succeeded.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.records_scored.load(Ordering::Relaxed), 6);
        assert_eq!(metrics.high_risk_decisions.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.degraded_requests.load(Ordering::Relaxed), 1);

        let by_tier = metrics.get_records_by_tier();
        assert_eq!(by_tier[RiskTier::Low.as_str()], 2);
        assert_eq!(by_tier["medium"], 2);
        assert_eq!(by_tier["high"], 2);
        assert_eq!(by_tier.len(), RiskTier::ALL.len());

        // p = 1.0 lands in the top bucket
        let distribution = metrics.get_probability_distribution();
        assert_eq!(distribution[1], 2);
        assert_eq!(distribution[4], 2);
        assert_eq!(distribution[9], 2);

        assert_eq!(metrics.get_soft_misses(), vec![("loan_int_rate".to_string(), 1)]);
        assert_eq!(metrics.get_processing_stats().count, 2);
    }

    #[test]
    fn test_failures_by_stage() {
        let metrics = PipelineMetrics::new();
        metrics.record_failure(Stage::Normalize);
        metrics.record_failure(Stage::Normalize);
        metrics.record_failure(Stage::Infer);

        assert_eq!(metrics.requests_failed.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.failures_for(Stage::Normalize), 2);
        assert_eq!(metrics.failures_for(Stage::Infer), 1);
        assert_eq!(metrics.failures_for(Stage::Select), 0);
    }

    #[test]
    fn test_empty_stats() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.get_processing_stats().count, 0);
        assert!(metrics.get_soft_misses().is_empty());
    }
}
