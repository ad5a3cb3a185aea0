//! Bounded-retry HTTP helper shared by every driver: 429 respects
//! `Retry-After` with exponential backoff up to a retry budget, 5xx gets a
//! few quick retries, everything else propagates immediately. Grounded on
//! the shared `call_with_backoff` helper the teacher's providers all used.

use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::time::sleep;

const MAX_RATE_LIMIT_RETRIES: u32 = 8;
const MAX_SERVER_ERROR_RETRIES: u32 = 3;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub async fn call_with_backoff<F>(source: &str, mut builder_fn: F) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut rate_limit_retries = 0;
    let mut server_error_retries = 0;
    let mut delay = Duration::from_secs(1);

    loop {
        let response = builder_fn().send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 429 {
            if rate_limit_retries >= MAX_RATE_LIMIT_RETRIES {
                return Err(anyhow!(
                    "{source}: rate limited after {rate_limit_retries} retries"
                ));
            }
            let wait = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(delay);

            tracing::warn!(source, ?wait, "rate limited, backing off");
            sleep(wait).await;
            rate_limit_retries += 1;
            delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            continue;
        }

        if status.is_server_error() && server_error_retries < MAX_SERVER_ERROR_RETRIES {
            tracing::warn!(source, %status, "server error, retrying");
            sleep(delay).await;
            server_error_retries += 1;
            delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            continue;
        }

        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("{source}: http {status} - {body}"));
    }
}
