use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, SplitwiseError};
use crate::model::{CurrentUserEnvelope, Expense, ExpensesEnvelope, FriendsEnvelope, User};

pub const DEFAULT_BASE_URL: &str = "https://secure.splitwise.com/api/v3.0";

/// Minimal read-only Splitwise client authenticated with a personal API key.
#[derive(Debug, Clone)]
pub struct SplitwiseClient {
    http: reqwest::Client,
    base_url: String,
}

impl SplitwiseClient {
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| SplitwiseError::Api {
            status: 0,
            body: "api key contains invalid header characters".to_string(),
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn current_user(&self) -> Result<User> {
        let env: CurrentUserEnvelope = self.get("get_current_user", &[]).await?;
        Ok(env.user)
    }

    pub async fn friends(&self) -> Result<Vec<User>> {
        let env: FriendsEnvelope = self.get("get_friends", &[]).await?;
        Ok(env.friends)
    }

    /// Expenses updated in `(now - lookback, now]`, at most `limit`.
    pub async fn recent_expenses(&self, now: DateTime<Utc>, lookback: Duration, limit: u32) -> Result<Vec<Expense>> {
        let query = [
            ("updated_after", (now - lookback).to_rfc3339()),
            ("updated_before", now.to_rfc3339()),
            ("limit", limit.to_string()),
        ];
        let env: ExpensesEnvelope = self.get("get_expenses", &query).await?;
        debug!(count = env.expenses.len(), "fetched splitwise expenses");
        Ok(env.expenses)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url);
        let resp = self.http.get(&url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SplitwiseError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
