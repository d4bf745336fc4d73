// src/models.rs
use rust_decimal::Decimal;

/// Aggregate row of one batch (`totals` table). `batch_id` is the row id.
#[derive(Debug, Clone, PartialEq)]
pub struct TotalsSnapshot {
    pub batch_id: i64,
    pub amp_total: u128,  // smallest unit (1e-18 AMP)
    pub usd_total: Decimal,
}

/// Per-pool row of one batch (`tvl` table).
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    #[allow(dead_code)]
    pub id: i64,
    pub batch_id: i64,
    pub pool_name: String,
    #[allow(dead_code)]
    pub contract_address: String,
    pub amp_amount: u128,
    pub usd_value: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPoolSnapshot {
    pub pool_name: String,
    pub contract_address: String,
    pub amp_amount: u128,
    pub usd_value: Decimal,
}

/// Everything one run writes: the totals are derived from the pool rows.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBatch {
    pub amp_total: u128,
    pub usd_total: Decimal,
    pub pools: Vec<NewPoolSnapshot>,
}

impl NewBatch {
    pub fn from_pools(pools: Vec<NewPoolSnapshot>) -> Self {
        let amp_total = pools.iter().map(|p| p.amp_amount).sum();
        let usd_total = pools.iter().map(|p| p.usd_value).sum();
        Self {
            amp_total,
            usd_total,
            pools,
        }
    }
}
