//! Visit API client.
//!
//! One GET per cycle against the visit-export endpoint, authenticated
//! with an `apikey` header, scoped to a rolling-day query window. The
//! request carries a bounded timeout so a stalled response cannot hang
//! the sync loop.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::error::{Error, Result};

/// The operational day starts at 06:00 local time.
const WINDOW_START: NaiveTime = NaiveTime::from_hms_opt(6, 0, 0).unwrap();

/// Wire format the export endpoint expects for window bounds.
const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+0000";

/// Client for the visit-export endpoint.
pub struct VisitClient {
    client: Client,
    url: String,
    api_key: String,
    timeout: std::time::Duration,
}

impl VisitClient {
    /// Build a client from the resolved configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
        }
    }

    /// Fetch the visit records for the rolling day containing `now`.
    ///
    /// The endpoint returns a JSON array; a single-object response is
    /// normalized to a one-element list so callers always iterate.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure, timeout, a non-success
    /// status (carrying the status code and body), or an undecodable
    /// response body.
    pub async fn fetch(&self, now: DateTime<Tz>) -> Result<Vec<Value>> {
        let (from_time, to_time) = query_window(now);

        let response = self
            .client
            .get(&self.url)
            .header("apikey", &self.api_key)
            .query(&[
                ("format", "JSON"),
                ("fromTime", from_time.as_str()),
                ("toTime", to_time.as_str()),
                ("dateRangeField", "created"),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ApiStatus {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        Ok(match payload {
            Value::Array(records) => records,
            single => vec![single],
        })
    }
}

/// Compute the query window `[fromTime, toTime)` for the rolling day
/// containing `now`: it starts at the most recent 06:00 local time and
/// spans 24 hours. Before 06:00 the window is anchored at 06:00 the
/// previous day, so an early-morning poll still covers the day in
/// progress rather than one that has not started.
#[must_use]
pub fn query_window(now: DateTime<Tz>) -> (String, String) {
    let local = now.naive_local();

    let mut start = local.date().and_time(WINDOW_START);
    if local < start {
        start = start - Duration::days(1);
    }
    let end = start + Duration::days(1);

    (format_window(start), format_window(end))
}

fn format_window(t: NaiveDateTime) -> String {
    t.format(WINDOW_FORMAT).to_string()
}
