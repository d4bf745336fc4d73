use reqwest::Client;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::Config;
use crate::http::FetchError;
use crate::models::{NewBatch, NewPoolSnapshot};
use crate::pools::{self, CollateralPool, PoolTarget};
use crate::price;
use crate::rpc::BalanceReader;

/// Result of one acquisition pass: the batch to store plus the live pool
/// listing, which the report reuses for APY labels.
pub struct Collected {
    pub batch: NewBatch,
    pub listing: Vec<CollateralPool>,
}

/// Price → pool listing → per-pool on-chain balances, strictly in sequence.
pub async fn collect(client: &Client, cfg: &Config) -> Result<Collected, FetchError> {
    let amp_price = price::fetch_amp_price(client, &cfg.price_url).await?;

    let listing = pools::fetch_collateral_pools(client, &cfg.pools_url).await?;
    let targets = pools::targets(&listing)?;
    for pool in &listing {
        debug!(
            "{}: APY 7d {} / 30d {}",
            pool.entity.name, pool.reward_rate.seven_day.label, pool.reward_rate.thirty_day.label
        );
    }

    let reader = BalanceReader::connect(client, cfg).await?;
    let balances = reader.read_all(&targets).await?;

    let snapshots = value_pools(targets, balances, amp_price)?;
    let batch = NewBatch::from_pools(snapshots);

    info!(
        "Collected {} pools: {} wei, ${}",
        batch.pools.len(),
        batch.amp_total,
        batch.usd_total
    );

    Ok(Collected { batch, listing })
}

fn value_pools(
    targets: Vec<PoolTarget>,
    balances: Vec<u128>,
    amp_price: Decimal,
) -> Result<Vec<NewPoolSnapshot>, FetchError> {
    targets
        .into_iter()
        .zip(balances)
        .map(|(target, amount)| {
            Ok(NewPoolSnapshot {
                usd_value: value_usd(amount, amp_price)?,
                pool_name: target.name,
                contract_address: target.contract,
                amp_amount: amount,
            })
        })
        .collect()
}

/// Whole-dollar value of `amount` wei at `price`, banker's rounding.
pub fn value_usd(amount: u128, price: Decimal) -> Result<Decimal, FetchError> {
    let overflow = || FetchError::parse("valuation", format!("{amount} wei at ${price}"));

    let amp = i128::try_from(amount)
        .ok()
        .and_then(|wei| Decimal::try_from_i128_with_scale(wei, 18).ok())
        .ok_or_else(overflow)?;

    Ok(amp.checked_mul(price).ok_or_else(overflow)?.round())
}
