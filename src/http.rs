use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of an external data call. `Display` is the user-facing message.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Error: likely due to rate limiting, sit tight for 2 minutes & try again.")]
    Transport(#[from] reqwest::Error),

    #[error("Error fetching data from API. Status: {0}. Please alert an admin.")]
    Status(u16),

    #[error("Unexpected response from {source_name}: {detail}")]
    Parse {
        source_name: &'static str,
        detail: String,
    },

    #[error("{source_name} returned an error: {message}")]
    Api {
        source_name: &'static str,
        message: String,
    },
}

impl FetchError {
    pub fn parse(source_name: &'static str, detail: impl ToString) -> Self {
        FetchError::Parse {
            source_name,
            detail: detail.to_string(),
        }
    }
}

/// Shared client for every outbound call of a run.
pub fn client() -> Result<Client, FetchError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("ampy-jr/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// GET `url` and decode the JSON body into `T`.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    source_name: &'static str,
) -> Result<T, FetchError> {
    debug!("📡 GET {}", source_name);

    let resp = client.get(url).send().await?;
    if resp.status() != StatusCode::OK {
        return Err(FetchError::Status(resp.status().as_u16()));
    }

    let text = resp.text().await?;
    decode(&text, source_name)
}

pub fn decode<T: DeserializeOwned>(text: &str, source_name: &'static str) -> Result<T, FetchError> {
    serde_json::from_str(text).map_err(|e| FetchError::parse(source_name, e))
}

/// Loopback HTTP server answering every request with a fixed status.
#[cfg(test)]
pub(crate) mod local {
    use reqwest::Client;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Client that never routes loopback traffic through an env proxy.
    pub fn client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    /// Serves `status_line` (e.g. "503 Service Unavailable") with an empty body.
    pub async fn serve_status(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                read_request(&mut sock).await;
                let resp = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        format!("http://{addr}/")
    }

    /// Address nothing listens on.
    pub async fn closed_port() -> String {
        let addr: SocketAddr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        format!("http://{addr}/")
    }

    // Drain headers and body so closing the socket doesn't reset the connection
    async fn read_request(sock: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match sock.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}
