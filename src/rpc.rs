// src/rpc.rs
use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::Address;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::http::{self, FetchError};
use crate::pools::PoolTarget;

const BALANCE_FN: &str = "accountBalances";

/// `accountBalances` returns a tuple; the staked AMP is its second element.
const BALANCE_OUTPUT_INDEX: usize = 1;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: String,
}

/// Fetch the verified ABI of `address` from Etherscan.
pub async fn fetch_abi(
    client: &Client,
    etherscan_url: &str,
    api_key: &str,
    address: &str,
) -> Result<JsonAbi, FetchError> {
    let url = format!(
        "{etherscan_url}?chainid=1&module=contract&action=getabi&address={address}&apikey={api_key}"
    );
    let resp: EtherscanResponse = http::get_json(client, &url, "etherscan").await?;
    parse_abi(resp)
}

fn parse_abi(resp: EtherscanResponse) -> Result<JsonAbi, FetchError> {
    if resp.status != "1" {
        return Err(FetchError::Api {
            source_name: "etherscan",
            message: format!("{}: {}", resp.message, resp.result),
        });
    }
    // ABI arrives JSON-encoded inside the `result` string
    http::decode(&resp.result, "etherscan abi")
}

fn balance_function(abi: &JsonAbi) -> Result<Function, FetchError> {
    let function = abi
        .function(BALANCE_FN)
        .and_then(|overloads| overloads.first())
        .ok_or_else(|| FetchError::parse("etherscan abi", format!("no `{BALANCE_FN}` function")))?;

    if function.inputs.len() != 2 || function.outputs.len() <= BALANCE_OUTPUT_INDEX {
        return Err(FetchError::parse(
            "etherscan abi",
            format!("unexpected signature `{}`", function.signature()),
        ));
    }
    Ok(function.clone())
}

fn parse_address(s: &str) -> Result<Address, FetchError> {
    s.parse()
        .map_err(|e| FetchError::parse("pool address", format!("`{s}`: {e}")))
}

/// Reads per-pool AMP balances from the staking contract, one `eth_call` per pool.
pub struct BalanceReader<'a> {
    client: &'a Client,
    rpc_url: &'a str,
    contract: Address,
    token: Address,
    function: Function,
    delay: Duration,
}

impl<'a> BalanceReader<'a> {
    pub async fn connect(client: &'a Client, cfg: &'a Config) -> Result<Self, FetchError> {
        let abi = fetch_abi(client, &cfg.etherscan_url, &cfg.etherscan_key, &cfg.anvil_contract).await?;
        let function = balance_function(&abi)?;
        info!("Resolved {} on {}", function.signature(), cfg.anvil_contract);

        Ok(Self {
            client,
            rpc_url: &cfg.rpc_http_url,
            contract: parse_address(&cfg.anvil_contract)?,
            token: parse_address(&cfg.amp_token)?,
            function,
            delay: cfg.read_delay,
        })
    }

    /// Read the AMP balance of every pool, pausing between reads to stay under rate limits.
    pub async fn read_all(&self, pools: &[PoolTarget]) -> Result<Vec<u128>, FetchError> {
        let mut balances = Vec::with_capacity(pools.len());

        for (i, pool) in pools.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.delay).await;
            }
            let balance = self.balance_of(parse_address(&pool.contract)?).await?;
            info!("🏦 {} ({}) → {} wei", pool.name, pool.contract, balance);
            balances.push(balance);
        }

        Ok(balances)
    }

    pub async fn balance_of(&self, pool: Address) -> Result<u128, FetchError> {
        let calldata = encode_call(&self.function, pool, self.token)?;
        let output = eth_call(self.client, self.rpc_url, self.contract, &calldata).await?;
        decode_balance(&self.function, &output)
    }
}

fn encode_call(function: &Function, pool: Address, token: Address) -> Result<Vec<u8>, FetchError> {
    function
        .abi_encode_input(&[DynSolValue::Address(pool), DynSolValue::Address(token)])
        .map_err(|e| FetchError::parse("abi encode", e))
}

fn decode_balance(function: &Function, output: &[u8]) -> Result<u128, FetchError> {
    let values = function
        .abi_decode_output(output)
        .map_err(|e| FetchError::parse("eth_call", e))?;

    let (amount, _) = values
        .get(BALANCE_OUTPUT_INDEX)
        .and_then(DynSolValue::as_uint)
        .ok_or_else(|| FetchError::parse("eth_call", "balance is not a uint"))?;

    u128::try_from(amount)
        .map_err(|_| FetchError::parse("eth_call", format!("balance {amount} overflows u128")))
}

/// Execute a read-only `eth_call` against the latest block.
pub async fn eth_call(
    client: &Client,
    rpc_url: &str,
    to: Address,
    data: &[u8],
) -> Result<Vec<u8>, FetchError> {
    let payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_call",
        "params": [{
            "to": to.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        }, "latest"]
    });

    debug!("📡 Sending eth_call → {}", to);

    let resp = client.post(rpc_url).json(&payload).send().await?;
    if resp.status() != StatusCode::OK {
        return Err(FetchError::Status(resp.status().as_u16()));
    }
    let text = resp.text().await?;
    decode_call_result(&text)
}

fn decode_call_result(text: &str) -> Result<Vec<u8>, FetchError> {
    let parsed: RpcResponse<String> = http::decode(text, "eth_call")?;
    if let Some(err) = parsed.error {
        return Err(FetchError::Api {
            source_name: "rpc",
            message: format!("{} (code {})", err.message, err.code),
        });
    }
    let result = parsed
        .result
        .ok_or_else(|| FetchError::parse("eth_call", "missing result"))?;

    hex::decode(result.trim_start_matches("0x")).map_err(|e| FetchError::parse("eth_call", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    const ABI: &str = r#"[
        {"type":"function","name":"accountBalances","stateMutability":"view",
         "inputs":[{"name":"account","type":"address"},{"name":"token","type":"address"}],
         "outputs":[{"name":"available","type":"uint256"},{"name":"staked","type":"uint256"}]},
        {"type":"function","name":"owner","stateMutability":"view","inputs":[],
         "outputs":[{"name":"","type":"address"}]}
    ]"#;

    fn abi_response(status: &str, result: &str) -> EtherscanResponse {
        EtherscanResponse {
            status: status.to_string(),
            message: if status == "1" { "OK" } else { "NOTOK" }.to_string(),
            result: result.to_string(),
        }
    }

    #[test]
    fn resolves_balance_function_from_etherscan_abi() {
        let abi = parse_abi(abi_response("1", ABI)).unwrap();
        let function = balance_function(&abi).unwrap();
        assert_eq!(function.signature(), "accountBalances(address,address)");
    }

    #[test]
    fn etherscan_error_status_is_api_error() {
        let err = parse_abi(abi_response("0", "Invalid API Key")).unwrap_err();
        assert!(matches!(err, FetchError::Api { .. }));
        assert!(err.to_string().contains("Invalid API Key"));
    }

    #[test]
    fn abi_without_balance_function_is_rejected() {
        let abi: JsonAbi = serde_json::from_str("[]").unwrap();
        assert!(matches!(balance_function(&abi), Err(FetchError::Parse { .. })));
    }

    #[test]
    fn encodes_call_and_decodes_second_output() {
        let abi = parse_abi(abi_response("1", ABI)).unwrap();
        let function = balance_function(&abi).unwrap();

        let pool = Address::repeat_byte(0x11);
        let token = Address::repeat_byte(0x22);
        let calldata = encode_call(&function, pool, token).unwrap();
        assert_eq!(&calldata[..4], function.selector().as_slice());
        assert_eq!(calldata.len(), 4 + 64);

        let staked = 1_500u128 * 10u128.pow(18);
        let output = DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(7u64), 256),
            DynSolValue::Uint(U256::from(staked), 256),
        ])
        .abi_encode_params();
        assert_eq!(decode_balance(&function, &output).unwrap(), staked);
    }

    #[test]
    fn rpc_error_payload_is_api_error() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"execution reverted"}}"#;
        let err = decode_call_result(body).unwrap_err();
        assert!(err.to_string().contains("execution reverted"));
    }

    #[test]
    fn decodes_hex_result() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":"0x00ff"}"#;
        assert_eq!(decode_call_result(body).unwrap(), vec![0x00, 0xff]);
    }

    #[tokio::test]
    async fn eth_call_surfaces_http_status() {
        let url = http::local::serve_status("503 Service Unavailable").await;
        let err = eth_call(&http::local::client(), &url, Address::ZERO, &[0x01])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(503)), "got {err:?}");
    }

    #[tokio::test]
    async fn eth_call_to_dead_node_is_transport_error() {
        let url = http::local::closed_port().await;
        let err = eth_call(&http::local::client(), &url, Address::ZERO, &[0x01])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)), "got {err:?}");
    }
}
