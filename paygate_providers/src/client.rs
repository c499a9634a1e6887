use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::ProviderApiError;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);

/// A thin JSON-over-HTTP client shared by the provider adapters.
///
/// Every request carries an explicit timeout. Non-2xx responses are returned as
/// [`ProviderApiError::QueryError`] with the status code, so that callers can tell transient failures from
/// rejections.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    client: Arc<Client>,
}

impl RestClient {
    pub fn new(base_url: &str, bearer_token: Option<&str>, timeout: Duration) -> Result<Self, ProviderApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        if let Some(token) = bearer_token {
            let val = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
            headers.insert("Authorization", val);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<B>,
    ) -> Result<T, ProviderApiError> {
        let url = if path.starts_with("http") { path.to_string() } else { self.url(path) };
        trace!("Sending {method} request: {url}");
        let mut req = self.client.request(method, url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            trace!("Request successful. {status}");
            response.json::<T>().await.map_err(|e| ProviderApiError::JsonError(e.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            debug!("Request failed. {status}: {message}");
            Err(ProviderApiError::QueryError { status: status.as_u16(), message })
        }
    }
}
