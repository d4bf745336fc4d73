// src/report.rs

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

use crate::models::{PoolSnapshot, TotalsSnapshot};
use crate::pools::CollateralPool;

const WEI_PER_AMP: f64 = 1e18;

/// Label used when the pools API has no entry for a stored pool name.
pub const MISSING_APY: &str = "N/A";

#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("Insufficient saved totals data. Need at least 2 records to compare, found {found}.")]
    InsufficientHistory { found: usize },

    #[error("No TVL data found for batch ids {current} and {previous}.")]
    NoPoolData { current: i64, previous: i64 },
}

/// `"+"` only when `current` is strictly greater; equal values give `"-"`.
pub fn get_sign(current: f64, previous: f64) -> &'static str {
    if current > previous {
        "+"
    } else {
        "-"
    }
}

/// Compact magnitude: 1B, 2.5M, 50K, 123.
pub fn human_readable(value: f64) -> String {
    if value < 0.0 {
        return format!("-{}", human_readable(-value));
    }

    let (scaled, suffix) = if value >= 1e9 {
        (value / 1e9, "B")
    } else if value >= 1e6 {
        (value / 1e6, "M")
    } else if value >= 1e3 {
        (value / 1e3, "K")
    } else {
        return format!("{value:.0}");
    };

    let formatted = format!("{scaled:.1}");
    let trimmed = formatted.strip_suffix(".0").unwrap_or(&formatted);
    format!("{trimmed}{suffix}")
}

pub fn wei_to_amp(amount: u128) -> f64 {
    amount as f64 / WEI_PER_AMP
}

fn usd(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Unsigned change plus direction between two readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delta {
    pub sign: &'static str,
    pub magnitude: f64,
}

impl Delta {
    pub fn between(current: f64, previous: f64) -> Self {
        Self {
            sign: get_sign(current, previous),
            magnitude: (current - previous).abs(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude == 0.0
    }

    pub fn formatted(&self) -> String {
        human_readable(self.magnitude)
    }
}

/// `(+10K)`, or nothing at all when unchanged.
impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            Ok(())
        } else {
            write!(f, "({}{})", self.sign, self.formatted())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub current: f64,
    pub delta: Delta,
}

impl Aggregate {
    fn new(current: f64, previous: f64) -> Self {
        Self {
            current,
            delta: Delta::between(current, previous),
        }
    }

    /// `"{prefix}{value} {delta}"`, without trailing space when unchanged.
    pub fn render(&self, prefix: &str) -> String {
        format!("{prefix}{} {}", human_readable(self.current), self.delta)
            .trim_end()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolLine {
    pub name: String,
    pub apy_30d: String,
    pub capacity: String,
    pub amount: String,
    /// Empty when the amount is unchanged.
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub current_batch: i64,
    pub previous_batch: i64,
    pub spending_capacity: Aggregate,
    pub staked_amp: Aggregate,
    pub pools: Vec<PoolLine>,
}

/// Splits newest-first totals into `(current, previous)`.
pub fn check_history(totals: &[TotalsSnapshot]) -> Result<(&TotalsSnapshot, &TotalsSnapshot), ReportError> {
    match totals {
        [current, previous, ..] => Ok((current, previous)),
        _ => Err(ReportError::InsufficientHistory { found: totals.len() }),
    }
}

impl Report {
    pub fn build(
        totals: &[TotalsSnapshot],
        pools: &[PoolSnapshot],
        apys: &[CollateralPool],
    ) -> Result<Self, ReportError> {
        let (current, previous) = check_history(totals)?;

        if pools.is_empty() {
            return Err(ReportError::NoPoolData {
                current: current.batch_id,
                previous: previous.batch_id,
            });
        }

        let spending_capacity = Aggregate::new(usd(current.usd_total), usd(previous.usd_total));
        let staked_amp = Aggregate::new(wei_to_amp(current.amp_total), wei_to_amp(previous.amp_total));

        let lines = pools
            .iter()
            .filter(|p| p.batch_id == current.batch_id)
            .map(|pool| {
                let now = wei_to_amp(pool.amp_amount);
                let before = pools
                    .iter()
                    .find(|p| p.batch_id == previous.batch_id && p.pool_name == pool.pool_name)
                    .map(|p| wei_to_amp(p.amp_amount))
                    .unwrap_or(0.0);

                PoolLine {
                    name: pool.pool_name.clone(),
                    apy_30d: apy_label(apys, &pool.pool_name).to_string(),
                    capacity: format!("${}", human_readable(usd(pool.usd_value))),
                    amount: human_readable(now),
                    delta: Delta::between(now, before).to_string(),
                }
            })
            .collect();

        Ok(Self {
            current_batch: current.batch_id,
            previous_batch: previous.batch_id,
            spending_capacity,
            staked_amp,
            pools: lines,
        })
    }
}

/// 30-day label of the first pool whose name matches exactly.
pub fn apy_label<'a>(apys: &'a [CollateralPool], pool_name: &str) -> &'a str {
    apys.iter()
        .find(|p| p.entity.name == pool_name)
        .map(|p| p.reward_rate.thirty_day.label.as_str())
        .unwrap_or(MISSING_APY)
}
