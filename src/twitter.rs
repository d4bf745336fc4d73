// src/twitter.rs

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use sha1::Sha1;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TwitterCredentials;

const API_BASE: &str = "https://api.twitter.com";
const UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";

/// RFC 3986 unreserved characters stay literal.
const OAUTH_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Twitter API Unauthorized: {0}. Check your API credentials in the .env file")]
    Unauthorized(String),

    #[error("Twitter API Error 453: your API access level doesn't include posting tweets. Elevated or Enterprise access is required (https://developer.twitter.com/en/portal/products)")]
    AccessLevel,

    #[error("Twitter API Forbidden Error: {0}")]
    Forbidden(String),

    #[error("Twitter API returned {status}: {body}")]
    Unexpected { status: u16, body: String },

    #[error("Twitter request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected Twitter response: {0}")]
    Response(String),

    #[error("Failed to render report image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to sign request: {0}")]
    Signing(String),
}

/// Map a non-success status to its error category.
pub fn classify(status: StatusCode, body: &str) -> PublishError {
    match status {
        StatusCode::UNAUTHORIZED => PublishError::Unauthorized(body.to_string()),
        StatusCode::FORBIDDEN if body.contains("453") => PublishError::AccessLevel,
        StatusCode::FORBIDDEN => PublishError::Forbidden(body.to_string()),
        other => PublishError::Unexpected {
            status: other.as_u16(),
            body: body.to_string(),
        },
    }
}

fn encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE).to_string()
}

fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// `Authorization` header for one request. `params` are the query and
/// form-encoded body parameters; JSON and multipart bodies are not signed.
pub fn authorization_header(
    creds: &TwitterCredentials,
    method: &Method,
    url: &str,
    params: &[(&str, &str)],
    nonce: &str,
    timestamp: i64,
) -> Result<String, PublishError> {
    let timestamp = timestamp.to_string();
    let oauth = [
        ("oauth_consumer_key", creds.api_key.as_str()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", creds.access_token.as_str()),
        ("oauth_version", "1.0"),
    ];

    let mut encoded: Vec<(String, String)> = oauth
        .iter()
        .chain(params)
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let base = format!("{}&{}&{}", method.as_str(), encode(url), encode(&param_string));
    let key = format!(
        "{}&{}",
        encode(&creds.api_secret),
        encode(&creds.access_token_secret)
    );

    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|e| PublishError::Signing(e.to_string()))?;
    mac.update(base.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let mut header: Vec<(&str, String)> = oauth
        .iter()
        .map(|(k, v)| (*k, encode(v)))
        .collect();
    header.push(("oauth_signature", encode(&signature)));
    header.sort();

    Ok(format!(
        "OAuth {}",
        header
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect::<Vec<_>>()
            .join(", ")
    ))
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct User {
    username: String,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UploadedMedia {
    media_id_string: String,
}

pub struct TwitterClient {
    http: Client,
    creds: TwitterCredentials,
}

impl TwitterClient {
    pub fn new(http: Client, creds: TwitterCredentials) -> Self {
        Self { http, creds }
    }

    fn signed(&self, method: Method, url: &str) -> Result<RequestBuilder, PublishError> {
        let header = authorization_header(
            &self.creds,
            &method,
            url,
            &[],
            &nonce(),
            chrono::Utc::now().timestamp(),
        )?;
        Ok(self
            .http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, header))
    }

    /// Verify credentials; returns the account's handle.
    pub async fn verify(&self) -> Result<String, PublishError> {
        let url = format!("{API_BASE}/2/users/me");
        let resp = self.signed(Method::GET, &url)?.send().await?;
        let me: Envelope<User> = read(resp).await?;
        info!("Twitter authentication successful! Logged in as: @{}", me.data.username);
        Ok(me.data.username)
    }

    pub async fn upload_media(&self, png: Vec<u8>) -> Result<String, PublishError> {
        let part = multipart::Part::bytes(png)
            .file_name("tvl.png")
            .mime_str("image/png")?;
        let form = multipart::Form::new().part("media", part);

        let resp = self
            .signed(Method::POST, UPLOAD_URL)?
            .multipart(form)
            .send()
            .await?;
        let media: UploadedMedia = read(resp).await?;
        debug!("Uploaded media {}", media.media_id_string);
        Ok(media.media_id_string)
    }

    pub async fn post(&self, text: &str, media_id: &str) -> Result<String, PublishError> {
        let url = format!("{API_BASE}/2/tweets");
        let body = json!({
            "text": text,
            "media": { "media_ids": [media_id] }
        });

        let resp = self.signed(Method::POST, &url)?.json(&body).send().await?;
        let tweet: Envelope<CreatedTweet> = read(resp).await?;
        info!("Tweet posted successfully: {}", tweet.data.id);
        Ok(tweet.data.id)
    }

    /// Upload the image, then post it with `text`. Returns the tweet id.
    pub async fn publish(&self, text: &str, png: Vec<u8>) -> Result<String, PublishError> {
        let media_id = self.upload_media(png).await?;
        self.post(text, &media_id).await
    }
}

async fn read<T: DeserializeOwned>(resp: Response) -> Result<T, PublishError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(classify(status, &body));
    }
    serde_json::from_str(&body).map_err(|e| PublishError::Response(format!("{e}: {body}")))
}
