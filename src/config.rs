use dotenvy::dotenv;
use eyre::{eyre, Result};
use std::{env, time::Duration};
use tracing::info;

/// Pyth AMP/USD feed; closer to the value shown on app.flexa.co than CEX tickers.
pub const PYTH_AMP_FEED_ID: &str =
    "0xd37e4513ebe235fff81e453d400debaf9a49a5df2b7faa11b3831d35d7e72cb7";

/// Flexa "Anvil" staking contract holding collateral pool balances.
pub const ANVIL_CONTRACT: &str = "0x5d2725fdE4d7Aa3388DA4519ac0449Cc031d675f";

/// AMP ERC-20 token.
pub const AMP_TOKEN: &str = "0xff20817765cb7f73d4bde2e66e067e58d11095c2";

const DEFAULT_FLEXA_POOLS_URL: &str = "https://api.flexa.co/collateral_pools";
const DEFAULT_ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Dev,
    Prod,
}

impl Mode {
    /// Environment variable name for this mode; dev credentials live under a `DEV_` prefix.
    pub fn var(self, name: &str) -> String {
        match self {
            Mode::Dev => format!("DEV_{name}"),
            Mode::Prod => name.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct TwitterCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

// Secrets stay out of the startup log.
impl std::fmt::Debug for TwitterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterCredentials")
            .field("api_key", &"***")
            .field("access_token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub bot_name: String,
    pub db_path: String,
    pub price_url: String,
    pub pools_url: String,
    pub etherscan_url: String,
    pub etherscan_key: String,
    pub rpc_http_url: String,
    pub anvil_contract: String,
    pub amp_token: String,
    pub read_delay: Duration,
    /// `None` runs a single report and exits.
    pub interval: Option<Duration>,
    pub twitter: TwitterCredentials,
}

pub fn load(mode: Mode) -> Result<Config> {
    dotenv().ok();
    from_lookup(mode, |name| env::var(name).ok())
}

/// Builds the config from any variable source, so tests don't touch the process env.
pub fn from_lookup<F>(mode: Mode, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    // Collect every missing secret before failing so the operator fixes .env once
    let mut missing = Vec::new();
    let mut require = |name: String| match get(&name) {
        Some(v) => v,
        None => {
            missing.push(name);
            String::new()
        }
    };

    // The Alchemy key only builds the default endpoint
    let rpc_http_url = match get("RPC_HTTP_URL") {
        Some(url) => url,
        None => format!(
            "https://eth-mainnet.g.alchemy.com/v2/{}",
            require("ALCHEMY_API_KEY".to_string())
        ),
    };
    let etherscan_key = require("ETHERSCAN_API_KEY".to_string());
    let twitter = TwitterCredentials {
        api_key: require(mode.var("TWITTER_API_KEY")),
        api_secret: require(mode.var("TWITTER_API_SECRET")),
        access_token: require(mode.var("TWITTER_ACCESS_TOKEN")),
        access_token_secret: require(mode.var("TWITTER_ACCESS_TOKEN_SECRET")),
    };

    if !missing.is_empty() {
        return Err(eyre!(
            "Missing required environment variables: {}. Copy env.example to .env and fill them in",
            missing.join(", ")
        ));
    }

    let db_path = get(&mode.var("DATABASE_URL")).unwrap_or_else(|| match mode {
        Mode::Dev => "tvl-dev.db".to_string(),
        Mode::Prod => "tvl.db".to_string(),
    });

    let bot_name = get("BOT_NAME").unwrap_or_else(|| match mode {
        Mode::Dev => "Ampy Jr. Dev".to_string(),
        Mode::Prod => "Ampy Jr.".to_string(),
    });

    let price_url = get("PYTH_PRICE_URL").unwrap_or_else(|| {
        format!("https://hermes.pyth.network/v2/updates/price/latest?ids[]={PYTH_AMP_FEED_ID}")
    });

    // Flat throttle between per-pool contract reads (default: 1s)
    let read_delay_ms = get("BALANCE_READ_DELAY_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1_000);

    // Report interval (default: every 2 hours, 0 = single run)
    let interval_secs: u64 = get("REPORT_INTERVAL_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(7_200);

    let cfg = Config {
        mode,
        bot_name,
        db_path,
        price_url,
        pools_url: get("FLEXA_POOLS_URL").unwrap_or_else(|| DEFAULT_FLEXA_POOLS_URL.to_string()),
        etherscan_url: get("ETHERSCAN_API_URL")
            .unwrap_or_else(|| DEFAULT_ETHERSCAN_API_URL.to_string()),
        etherscan_key,
        rpc_http_url,
        anvil_contract: ANVIL_CONTRACT.to_string(),
        amp_token: AMP_TOKEN.to_string(),
        read_delay: Duration::from_millis(read_delay_ms),
        interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
        twitter,
    };

    info!(
        "Loaded config: mode={:?}, bot={}, db={}, interval={:?}",
        cfg.mode, cfg.bot_name, cfg.db_path, cfg.interval
    );

    Ok(cfg)
}
