//! Test Request Producer
//!
//! Generates loan applications, sends them as scoring requests over NATS and
//! logs the replies.

use credit_risk_scoring::types::{LoanApplication, ScoreRequest};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Loan application generator for testing
struct ApplicationGenerator {
    rng: rand::rngs::ThreadRng,
}

impl ApplicationGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Stable income, good grade, small loan relative to income
    fn generate_prime(&mut self) -> LoanApplication {
        let income = self.rng.gen_range(40_000.0..150_000.0);
        let amount = self.rng.gen_range(1_000.0..10_000.0);

        LoanApplication {
            person_income: round2(income),
            person_home_ownership: self.random_choice(&["OWN", "MORTGAGE"]).to_string(),
            person_emp_length: self.rng.gen_range(3..25) as f64,
            loan_intent: self
                .random_choice(&["EDUCATION", "HOMEIMPROVEMENT", "PERSONAL", "VENTURE"])
                .to_string(),
            loan_grade: self.random_choice(&["A", "B"]).to_string(),
            loan_amnt: round2(amount),
            loan_int_rate: round2(self.rng.gen_range(5.0..11.0)),
            loan_percent_income: round2(amount / income),
            cb_person_default_on_file: "N".to_string(),
            cb_person_cred_hist_length: self.rng.gen_range(4..20) as f64,
            faixa_etaria: self.random_choice(&["30-39", "40-49", "50-59"]).to_string(),
        }
    }

    /// Low income, poor grade, large loan relative to income
    fn generate_subprime(&mut self) -> LoanApplication {
        let income = self.rng.gen_range(8_000.0..35_000.0);
        let amount = self.rng.gen_range(5_000.0..(income * 0.8));

        LoanApplication {
            person_income: round2(income),
            person_home_ownership: self.random_choice(&["RENT", "OTHER"]).to_string(),
            person_emp_length: self.rng.gen_range(0..3) as f64,
            loan_intent: self
                .random_choice(&["DEBTCONSOLIDATION", "MEDICAL", "PERSONAL"])
                .to_string(),
            loan_grade: self.random_choice(&["D", "E", "F", "G"]).to_string(),
            loan_amnt: round2(amount),
            loan_int_rate: round2(self.rng.gen_range(14.0..23.0)),
            loan_percent_income: round2(amount / income),
            cb_person_default_on_file: self.random_choice(&["Y", "N"]).to_string(),
            cb_person_cred_hist_length: self.rng.gen_range(2..5) as f64,
            faixa_etaria: self.random_choice(&["20-29", "30-39"]).to_string(),
        }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }

    fn generate(&mut self, subprime_rate: f64) -> LoanApplication {
        if self.rng.gen_bool(subprime_rate) {
            self.generate_subprime()
        } else {
            self.generate_prime()
        }
    }

    fn request(&mut self, batch_size: usize, subprime_rate: f64) -> ScoreRequest {
        if batch_size <= 1 {
            ScoreRequest::Single {
                features: self.generate(subprime_rate).to_record(),
                threshold: None,
            }
        } else {
            ScoreRequest::Batch {
                records: (0..batch_size)
                    .map(|_| self.generate(subprime_rate).to_record())
                    .collect(),
                threshold: None,
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Request Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("credit.score");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);
    let batch_size: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(1);
    let subprime_rate: f64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(0.3);
    let delay_ms: u64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        batch_size = batch_size,
        subprime_rate = subprime_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, batch_size, subprime_rate).await;
        }
    };

    let mut generator = ApplicationGenerator::new();
    let mut failed = 0;

    for i in 0..count {
        let request = generator.request(batch_size, subprime_rate);
        let payload = serde_json::to_vec(&request)?;

        match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => {
                let body: serde_json::Value = serde_json::from_slice(&reply.payload)?;
                if body.get("error").is_some() {
                    failed += 1;
                    warn!(request = i + 1, reply = %body, "Scoring request rejected");
                } else {
                    info!(request = i + 1, reply = %body, "Scoring reply received");
                }
            }
            Err(e) => {
                failed += 1;
                warn!(request = i + 1, error = %e, "Request failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!("Completed! Sent {} requests ({} failed)", count, failed);

    Ok(())
}

async fn run_dry_mode(count: u64, batch_size: usize, subprime_rate: f64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = ApplicationGenerator::new();

    for i in 0..count {
        let request = generator.request(batch_size, subprime_rate);
        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, serde_json::to_string_pretty(&request)?);
        }
    }

    Ok(())
}
