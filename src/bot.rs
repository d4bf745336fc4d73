use eyre::Result;
use reqwest::Client;
use rusqlite::Connection;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::collector;
use crate::config::Config;
use crate::db;
use crate::pools::CollateralPool;
use crate::render;
use crate::report::{self, Report, ReportError};
use crate::twitter::{PublishError, TwitterClient};

pub struct Bot {
    pub cfg: Config,
    pub http: Client,
    pub twitter: TwitterClient,
}

#[derive(Debug)]
pub enum RunOutcome {
    Posted { batch_id: i64, tweet_id: String },
    /// Run aborted cleanly; the next interval tries again.
    Skipped(String),
}

impl Bot {
    pub fn new(cfg: Config, http: Client) -> Self {
        let twitter = TwitterClient::new(http.clone(), cfg.twitter.clone());
        Self { cfg, http, twitter }
    }

    /// One full cycle: collect → save → compare → render → post.
    /// External-data and posting failures are reported as `Skipped`;
    /// only persistence errors are returned as `Err`.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let collected = match collector::collect(&self.http, &self.cfg).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Data collection failed: {}", e);
                return Ok(RunOutcome::Skipped(e.to_string()));
            }
        };

        // connect / use / drop within this run
        let report = {
            let mut conn = db::connect(&self.cfg.db_path)?;
            let batch_id = db::save_batch(&mut conn, &collected.batch)?;
            info!("💾 Saved batch {} ({} pools)", batch_id, collected.batch.pools.len());

            match load_report(&conn, &collected.listing)? {
                Ok(r) => r,
                Err(e) => {
                    error!("{}", e);
                    return Ok(RunOutcome::Skipped(e.to_string()));
                }
            }
        };

        info!("Spending Capacity: {}", report.spending_capacity.render("$"));
        info!("Staked AMP: {}", report.staked_amp.render(""));

        match self.publish(&report).await {
            Ok(tweet_id) => Ok(RunOutcome::Posted {
                batch_id: report.current_batch,
                tweet_id,
            }),
            Err(e) => {
                error!("❌ Failed to post report: {}", e);
                Ok(RunOutcome::Skipped(e.to_string()))
            }
        }
    }

    async fn publish(&self, report: &Report) -> Result<String, PublishError> {
        let table = render::report_table(report);
        info!("\n{}", table);

        let png = render::table_png(&table)?;
        let text = render::status_text(&self.cfg.bot_name, report);
        self.twitter.publish(&text, png).await
    }
}

/// Calls `run` on every tick of `every` (the first tick fires immediately)
/// until `shutdown` resolves. Shutdown is watched during runs too, so an
/// in-flight run is abandoned instead of finishing first. Returns the
/// number of runs started.
pub async fn run_every<S, F, Fut>(every: Duration, shutdown: S, mut run: F) -> usize
where
    S: Future,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunOutcome>>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // one listener for the whole loop, never re-created
    tokio::pin!(shutdown);
    let mut started = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                started += 1;
                tokio::select! {
                    result = run() => match result {
                        Ok(outcome) => log_outcome(outcome),
                        Err(e) => error!("Run failed: {:?}", e),
                    },
                    _ = &mut shutdown => {
                        info!("Bot stopped by user during run {}", started);
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Bot stopped by user");
                break;
            }
        }
    }

    started
}

pub fn log_outcome(outcome: RunOutcome) {
    match outcome {
        RunOutcome::Posted { batch_id, tweet_id } => {
            info!("✅ Posted batch {} as tweet {}", batch_id, tweet_id)
        }
        RunOutcome::Skipped(reason) => warn!("Run skipped: {}", reason),
    }
}

/// Read the two latest batches and compare them. The outer error is a
/// database failure, the inner one a report that cannot be built yet.
pub fn load_report(
    conn: &Connection,
    listing: &[CollateralPool],
) -> Result<Result<Report, ReportError>> {
    let totals = db::latest_totals(conn, 2)?;
    let (current, previous) = match report::check_history(&totals) {
        Ok(pair) => pair,
        Err(e) => return Ok(Err(e)),
    };
    let pools = db::pools_for_batches(conn, current.batch_id, previous.batch_id)?;

    Ok(Report::build(&totals, &pools, listing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, Mode};
    use crate::http::local;
    use crate::models::{NewBatch, NewPoolSnapshot};
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    const AMP: u128 = 1_000_000_000_000_000_000;

    fn batch(pools: &[(&str, u128, i64)]) -> NewBatch {
        NewBatch::from_pools(
            pools
                .iter()
                .map(|(name, amp, usd)| NewPoolSnapshot {
                    pool_name: name.to_string(),
                    contract_address: format!("0x{name}"),
                    amp_amount: *amp,
                    usd_value: Decimal::from(*usd),
                })
                .collect(),
        )
    }

    fn store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn first_run_has_no_history() {
        let mut conn = store();
        db::save_batch(&mut conn, &batch(&[("a", AMP, 1)])).unwrap();

        let result = load_report(&conn, &[]).unwrap();
        assert_eq!(result, Err(ReportError::InsufficientHistory { found: 1 }));
    }

    #[test]
    fn compares_latest_two_batches_only() {
        let mut conn = store();
        db::save_batch(&mut conn, &batch(&[("a", 1_000 * AMP, 4)])).unwrap();
        db::save_batch(&mut conn, &batch(&[("a", 90 * AMP, 80), ("b", 5 * AMP, 20)])).unwrap();
        let latest = db::save_batch(&mut conn, &batch(&[("a", 95 * AMP, 80), ("b", 5 * AMP, 20)])).unwrap();

        let report = load_report(&conn, &[]).unwrap().unwrap();
        assert_eq!(report.current_batch, latest);
        assert_eq!(report.staked_amp.render(""), "100 (+5)");
        assert_eq!(report.spending_capacity.render("$"), "$100");
        assert_eq!(report.pools.len(), 2);
        assert_eq!(report.pools[0].delta, "(+5)");
        assert_eq!(report.pools[1].delta, "");
    }

    fn config_with(overrides: &[(&str, &str)]) -> Config {
        let mut env: HashMap<String, String> = [
            ("ALCHEMY_API_KEY", "alchemy"),
            ("ETHERSCAN_API_KEY", "etherscan"),
            ("TWITTER_API_KEY", "key"),
            ("TWITTER_API_SECRET", "secret"),
            ("TWITTER_ACCESS_TOKEN", "token"),
            ("TWITTER_ACCESS_TOKEN_SECRET", "token-secret"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in overrides {
            env.insert(k.to_string(), v.to_string());
        }
        config::from_lookup(Mode::Prod, |k| env.get(k).cloned()).unwrap()
    }

    #[tokio::test]
    async fn price_outage_skips_without_writing_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("tvl.db");
        let price_url = local::serve_status("503 Service Unavailable").await;
        let cfg = config_with(&[
            ("DATABASE_URL", db_path.to_str().unwrap()),
            ("PYTH_PRICE_URL", price_url.as_str()),
        ]);
        let conn = db::connect(&cfg.db_path).unwrap();
        db::run_migrations(&conn).unwrap();

        let bot = Bot::new(cfg, local::client());
        match bot.run_once().await.unwrap() {
            RunOutcome::Skipped(msg) => {
                assert_eq!(msg, "Error fetching data from API. Status: 503. Please alert an admin.")
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert!(db::latest_totals(&conn, 2).unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_during_a_run_stops_the_loop() {
        let (stop, stopped) = oneshot::channel::<()>();
        let mut stop = Some(stop);
        let calls = AtomicUsize::new(0);

        let looped = run_every(Duration::from_millis(10), stopped, || {
            calls.fetch_add(1, Ordering::SeqCst);
            // Ctrl-C arrives while the first run is still reading balances
            if let Some(stop) = stop.take() {
                let _ = stop.send(());
            }
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(RunOutcome::Skipped("slow".to_string()))
            }
        });

        let started = tokio::time::timeout(Duration::from_secs(5), looped)
            .await
            .expect("loop ignored shutdown");
        assert_eq!(started, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keeps_running_until_shutdown() {
        let (stop, stopped) = oneshot::channel::<()>();
        let mut stop = Some(stop);
        let mut calls = 0;

        let started = run_every(Duration::from_millis(1), stopped, || {
            calls += 1;
            if calls == 3 {
                if let Some(stop) = stop.take() {
                    let _ = stop.send(());
                }
            }
            async { Ok(RunOutcome::Skipped("nothing new".to_string())) }
        })
        .await;

        // shutdown lands during or right after the third run
        assert!(started >= 3);
    }
}
