// src/pools.rs
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::http::{self, FetchError};

const SOURCE: &str = "flexa";

#[derive(Debug, Clone, Deserialize)]
pub struct CollateralPools {
    pub data: Vec<CollateralPool>,
}

/// One entry of the Flexa `collateral_pools` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CollateralPool {
    /// Namespaced id, e.g. `eip155:1:0xabc...`
    pub id: String,
    pub entity: Entity,
    pub reward_rate: RewardRate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardRate {
    #[serde(rename = "7_day")]
    pub seven_day: RateLabel,
    #[serde(rename = "30_day")]
    pub thirty_day: RateLabel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLabel {
    pub label: String,
}

/// A pool to read on-chain: display name plus partition address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTarget {
    pub name: String,
    pub contract: String,
}

pub async fn fetch_collateral_pools(
    client: &Client,
    url: &str,
) -> Result<Vec<CollateralPool>, FetchError> {
    let pools: CollateralPools = http::get_json(client, url, SOURCE).await?;
    info!("Fetched {} collateral pools", pools.data.len());
    Ok(pools.data)
}

impl CollateralPool {
    pub fn target(&self) -> Result<PoolTarget, FetchError> {
        let contract = self
            .id
            .split(':')
            .nth(2)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::parse(SOURCE, format!("pool id `{}`", self.id)))?;

        Ok(PoolTarget {
            name: display_name(&self.entity.name),
            contract: contract.to_string(),
        })
    }
}

pub fn targets(pools: &[CollateralPool]) -> Result<Vec<PoolTarget>, FetchError> {
    pools.iter().map(CollateralPool::target).collect()
}

/// Drops the word "Wallet" so "Foo Wallet" is stored as "Foo".
pub fn display_name(name: &str) -> String {
    if name.to_lowercase().contains("wallet") {
        name.replace("Wallet", "").replace("wallet", "").trim().to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "data": [
            {
                "id": "eip155:1:0x1111111111111111111111111111111111111111",
                "entity": {"name": "Gemini Wallet", "logo": "x.png"},
                "reward_rate": {"7_day": {"label": "5.1%"}, "30_day": {"label": "4.8%"}}
            },
            {
                "id": "eip155:1:0x2222222222222222222222222222222222222222",
                "entity": {"name": "Bitcoin"},
                "reward_rate": {"7_day": {"label": "3.0%"}, "30_day": {"label": "3.2%"}}
            }
        ]
    }"#;

    #[test]
    fn parses_listing_into_targets() {
        let pools: CollateralPools = http::decode(BODY, SOURCE).unwrap();
        assert_eq!(pools.data[0].reward_rate.thirty_day.label, "4.8%");
        assert_eq!(pools.data[1].reward_rate.seven_day.label, "3.0%");

        let targets = targets(&pools.data).unwrap();
        assert_eq!(
            targets,
            vec![
                PoolTarget {
                    name: "Gemini".to_string(),
                    contract: "0x1111111111111111111111111111111111111111".to_string(),
                },
                PoolTarget {
                    name: "Bitcoin".to_string(),
                    contract: "0x2222222222222222222222222222222222222222".to_string(),
                },
            ]
        );
    }

    #[test]
    fn missing_reward_rate_is_parse_error() {
        let body = r#"{"data": [{"id": "a:b:c", "entity": {"name": "x"}}]}"#;
        assert!(matches!(
            http::decode::<CollateralPools>(body, SOURCE),
            Err(FetchError::Parse { .. })
        ));
    }

    #[test]
    fn short_id_is_parse_error() {
        let pool = CollateralPool {
            id: "eip155:1".to_string(),
            entity: Entity { name: "x".to_string() },
            reward_rate: RewardRate {
                seven_day: RateLabel { label: "1%".to_string() },
                thirty_day: RateLabel { label: "1%".to_string() },
            },
        };
        assert!(matches!(pool.target(), Err(FetchError::Parse { .. })));
    }

    #[test]
    fn strips_wallet_suffix() {
        assert_eq!(display_name("Gemini Wallet"), "Gemini");
        assert_eq!(display_name("wallet Foo"), "Foo");
        assert_eq!(display_name("Spedn"), "Spedn");
    }
}
