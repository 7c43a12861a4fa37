//! OAuth device flow against github.com.

use crate::auth::store::CredentialStore;
use crate::auth::DEFAULT_HOST;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

// The "jip" OAuth app client id. Safe to embed in version control; the
// device flow needs no client secret.
const OAUTH_CLIENT_ID: &str = "Ov23liy1wX3wH8zYSRgs";

const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    interval: u64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Runs the OAuth device flow and stores the resulting token for
/// github.com. Prints the one-time code and verification URL, then polls
/// until the user authorizes the app or the code expires.
pub async fn login(store: &CredentialStore) -> Result<()> {
    let http = reqwest::Client::new();

    let device: DeviceCodeResponse = http
        .post(DEVICE_CODE_URL)
        .header("Accept", "application/json")
        .form(&[("client_id", OAUTH_CLIENT_ID), ("scope", "repo")])
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::Api(format!("requesting device code: {e}")))?
        .json()
        .await?;

    println!("First copy your one-time code: {}", device.user_code);
    println!("Then open: {}", device.verification_uri);

    let mut interval = device.interval.max(1);
    let mut waited = 0u64;
    loop {
        tokio::time::sleep(Duration::from_secs(interval)).await;
        waited += interval;
        if waited > device.expires_in {
            return Err(Error::Api("device code expired before authorization".to_string()));
        }

        let token: AccessTokenResponse = http
            .post(ACCESS_TOKEN_URL)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", OAUTH_CLIENT_ID),
                ("device_code", device.device_code.as_str()),
                ("grant_type", GRANT_TYPE),
            ])
            .send()
            .await?
            .json()
            .await?;

        if let Some(access_token) = token.access_token {
            store.save_token(DEFAULT_HOST, &access_token)?;
            println!("Authentication successful! Token saved.");
            return Ok(());
        }

        match token.error.as_deref() {
            Some("authorization_pending") => {
                debug!("authorization pending, polling again");
            }
            Some("slow_down") => {
                interval += 5;
            }
            Some(other) => {
                return Err(Error::Api(format!("OAuth device flow failed: {other}")));
            }
            None => {
                return Err(Error::Api(
                    "OAuth device flow returned neither token nor error".to_string(),
                ));
            }
        }
    }
}
