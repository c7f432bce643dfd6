//! Google OAuth for the Sheets store: static token or service-account key

use autopost_domain::SourceError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::Mutex;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are replaced this long before Google says they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a downloaded service-account JSON key that matter here
#[derive(Debug, Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: SecretString,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct KeyFile {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SourceError::Auth(format!(
                "Cannot read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        let file: KeyFile = serde_json::from_str(&raw).map_err(|e| {
            SourceError::Auth(format!(
                "Invalid service account key {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            client_email: file.client_email,
            private_key: SecretString::from(file.private_key),
            token_uri: file.token_uri,
        })
    }
}

/// How Sheets requests are authorized
#[derive(Debug, Clone)]
pub enum SheetsAuth {
    /// An OAuth access token obtained elsewhere; used until it is rejected
    Token(SecretString),
    /// Signed JWT assertions exchanged for short-lived access tokens
    ServiceAccount(ServiceAccountKey),
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

/// Hands out bearer tokens, exchanging service-account assertions as needed
pub(crate) struct TokenSource {
    auth: SheetsAuth,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub(crate) fn new(auth: SheetsAuth) -> Self {
        Self {
            auth,
            cached: Mutex::new(None),
        }
    }

    pub(crate) async fn bearer(&self, client: &Client) -> Result<SecretString, SourceError> {
        let key = match &self.auth {
            SheetsAuth::Token(token) => return Ok(token.clone()),
            SheetsAuth::ServiceAccount(key) => key,
        };

        // Held across the exchange so concurrent callers share one refresh
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached
            .as_ref()
            .filter(|entry| Instant::now() < entry.refresh_at)
        {
            return Ok(entry.token.clone());
        }

        let response = exchange(client, key).await?;
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(REFRESH_MARGIN);
        tracing::debug!(
            client_email = %key.client_email,
            expires_in = response.expires_in,
            "Obtained Sheets access token"
        );

        let token = SecretString::from(response.access_token);
        *cached = Some(CachedToken {
            token: token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token)
    }
}

fn sign_assertion(key: &ServiceAccountKey, now: i64) -> Result<String, SourceError> {
    let claims = Claims {
        iss: &key.client_email,
        scope: SHEETS_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())
        .map_err(|e| SourceError::Auth(format!("Invalid service account private key: {}", e)))?;

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| SourceError::Auth(format!("Failed to sign token request: {}", e)))
}

async fn exchange(client: &Client, key: &ServiceAccountKey) -> Result<TokenResponse, SourceError> {
    let assertion = sign_assertion(key, OffsetDateTime::now_utc().unix_timestamp())?;

    let response = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| SourceError::Network(e.to_string()))?;

    let status = response.status();
    if status == 429 {
        return Err(SourceError::RateLimited(None));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Auth(format!(
            "Token endpoint returned {}: {}",
            status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| SourceError::Parse(format!("Invalid token response: {}", e)))
}
