// src/price.rs
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::http::{self, FetchError};

const SOURCE: &str = "pyth";

#[derive(Debug, Deserialize)]
struct LatestPrice {
    parsed: Vec<ParsedUpdate>,
}

#[derive(Debug, Deserialize)]
struct ParsedUpdate {
    price: PriceQuote,
}

#[derive(Debug, Deserialize)]
struct PriceQuote {
    /// Integer mantissa, sent as a string
    price: String,
    expo: i32,
}

/// Fetch the current AMP/USD price from Pyth Hermes.
pub async fn fetch_amp_price(client: &Client, url: &str) -> Result<Decimal, FetchError> {
    let latest: LatestPrice = http::get_json(client, url, SOURCE).await?;
    let price = quote_to_decimal(&latest)?;
    info!("💲 AMP price: ${}", price);
    Ok(price)
}

fn quote_to_decimal(latest: &LatestPrice) -> Result<Decimal, FetchError> {
    let quote = &latest
        .parsed
        .first()
        .ok_or_else(|| FetchError::parse(SOURCE, "empty `parsed` list"))?
        .price;

    let mantissa: i64 = quote
        .price
        .parse()
        .map_err(|e| FetchError::parse(SOURCE, format!("price `{}`: {e}", quote.price)))?;

    // price / 10^|expo|
    Decimal::try_from_i128_with_scale(mantissa as i128, quote.expo.unsigned_abs())
        .map_err(|e| FetchError::parse(SOURCE, format!("expo {}: {e}", quote.expo)))
}
