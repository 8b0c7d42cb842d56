//! Synthetic Transaction Generator
//!
//! Writes a PaySim-shaped transactions CSV for running the monitor locally.
//!
//! usage: generate-transactions [--output PATH] [--count N] [--fraud-rate R] [--missing-rate R] [--seed S]

use anyhow::Context;
use clap::Parser;
use fraud_monitor::dataset::write_atomic;
use fraud_monitor::Transaction;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tracing::info;

const TYPES: [&str; 5] = ["CASH_IN", "CASH_OUT", "DEBIT", "PAYMENT", "TRANSFER"];

#[derive(Debug, Parser)]
#[command(name = "generate-transactions", about = "Write a synthetic transactions CSV")]
struct Args {
    #[arg(short, long, default_value = "data/fraud.csv")]
    output: PathBuf,
    #[arg(short = 'n', long, default_value_t = 10_000)]
    count: usize,
    #[arg(long, default_value_t = 0.02)]
    fraud_rate: f64,
    /// Chance that each balance is left blank
    #[arg(long, default_value_t = 0.0)]
    missing_rate: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Transaction generator
struct TransactionGenerator {
    rng: StdRng,
    step: u32,
    missing_rate: f64,
}

impl TransactionGenerator {
    fn new(seed: u64, missing_rate: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            step: 1,
            missing_rate,
        }
    }

    fn account(&mut self, prefix: char) -> String {
        format!("{}{}", prefix, self.rng.gen_range(100_000_000u64..2_000_000_000))
    }

    /// Blank out a balance now and then
    fn maybe_missing(&mut self, value: f64) -> Option<f64> {
        if self.rng.gen_bool(self.missing_rate) {
            None
        } else {
            Some(value)
        }
    }

    fn advance_step(&mut self) -> f64 {
        if self.rng.gen_bool(0.01) {
            self.step += 1;
        }
        f64::from(self.step)
    }

    /// Ordinary activity across all transaction types
    fn generate_legitimate(&mut self) -> Transaction {
        let tx_type = TYPES[self.rng.gen_range(0..TYPES.len())];
        let amount: f64 = match tx_type {
            "PAYMENT" | "DEBIT" => self.rng.gen_range(5.0..2_000.0),
            _ => self.rng.gen_range(100.0..250_000.0),
        };
        let old_orig: f64 = if self.rng.gen_bool(0.3) {
            0.0
        } else {
            self.rng.gen_range(0.0..500_000.0)
        };
        let new_orig = if tx_type == "CASH_IN" {
            old_orig + amount
        } else {
            (old_orig - amount).max(0.0)
        };
        let (old_dest, new_dest) = if tx_type == "PAYMENT" {
            (0.0, 0.0)
        } else {
            let old: f64 = self.rng.gen_range(0.0..1_000_000.0);
            (old, old + amount)
        };
        self.build(tx_type, amount, old_orig, new_orig, old_dest, new_dest, 0)
    }

    /// Account takeover: the whole origin balance moved out
    fn generate_fraud(&mut self) -> Transaction {
        let tx_type = if self.rng.gen_bool(0.5) {
            "TRANSFER"
        } else {
            "CASH_OUT"
        };
        let amount: f64 = self.rng.gen_range(10_000.0..5_000_000.0);
        let (old_dest, new_dest) = if self.rng.gen_bool(0.6) {
            (0.0, 0.0)
        } else {
            let old: f64 = self.rng.gen_range(0.0..500_000.0);
            (old, old + amount)
        };
        self.build(tx_type, amount, amount, 0.0, old_dest, new_dest, 1)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &mut self,
        tx_type: &str,
        amount: f64,
        old_orig: f64,
        new_orig: f64,
        old_dest: f64,
        new_dest: f64,
        is_fraud: u8,
    ) -> Transaction {
        let mut tx = Transaction::new(tx_type, (amount * 100.0).round() / 100.0);
        tx.step = Some(self.advance_step());
        tx.name_orig = self.account('C');
        tx.name_dest = if tx_type == "PAYMENT" {
            self.account('M')
        } else {
            self.account('C')
        };
        tx.old_balance_orig = self.maybe_missing(old_orig);
        tx.new_balance_orig = self.maybe_missing(new_orig);
        tx.old_balance_dest = self.maybe_missing(old_dest);
        tx.new_balance_dest = self.maybe_missing(new_dest);
        tx.is_fraud = Some(is_fraud);
        tx.is_flagged_fraud = Some(u8::from(is_fraud == 1 && amount > 200_000.0 && tx_type == "TRANSFER"));
        tx
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_transactions=info".parse()?),
        )
        .init();

    let Args {
        output,
        count,
        fraud_rate,
        missing_rate,
        seed,
    } = Args::parse();

    anyhow::ensure!((0.0..=1.0).contains(&fraud_rate), "fraud rate must be in [0, 1]");
    anyhow::ensure!((0.0..=1.0).contains(&missing_rate), "missing rate must be in [0, 1]");

    info!(
        output = %output.display(),
        count,
        fraud_rate,
        missing_rate,
        seed,
        "Configuration loaded"
    );

    let mut generator = TransactionGenerator::new(seed, missing_rate);
    let mut writer = csv::Writer::from_writer(vec![]);
    let mut fraud_count = 0usize;

    for _ in 0..count {
        let tx = if generator.rng.gen_bool(fraud_rate) {
            fraud_count += 1;
            generator.generate_fraud()
        } else {
            generator.generate_legitimate()
        };
        writer.serialize(&tx)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush CSV buffer")?;
    write_atomic(&output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "Completed! Wrote {} transactions ({} legitimate, {} fraud) to {}",
        count,
        count - fraud_count,
        fraud_count,
        output.display()
    );
    Ok(())
}
