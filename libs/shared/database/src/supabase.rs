use std::time::Duration;

use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::DatabaseError;

/// PostgREST client for the Supabase project backing the practice data.
///
/// Backend services construct it with [`SupabaseClient::with_service_role`] so
/// that store access does not depend on an end-user token.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    default_token: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: build_client(config.provider_timeout_seconds),
            base_url: config.supabase_url.clone(),
            api_key: config.supabase_anon_key.clone(),
            default_token: None,
        }
    }

    pub fn with_service_role(config: &AppConfig) -> Self {
        Self {
            client: build_client(config.provider_timeout_seconds),
            base_url: config.supabase_url.clone(),
            api_key: config.store_key().to_string(),
            default_token: Some(config.store_key().to_string()),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, DatabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| DatabaseError::Unauthorized("Invalid API key header".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        if let Some(token) = auth_token.or(self.default_token.as_deref()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| DatabaseError::Unauthorized("Invalid bearer token".to_string()))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, DatabaseError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let headers = self.get_headers(auth_token)?;

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);
            return Err(DatabaseError::from_status(status.as_u16(), error_text));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// `GET /rest/v1/{table}?{query}`
    pub async fn select<T>(&self, table: &str, query: &str) -> Result<Vec<T>, DatabaseError>
    where T: DeserializeOwned {
        let path = if query.is_empty() {
            format!("/rest/v1/{}", table)
        } else {
            format!("/rest/v1/{}?{}", table, query)
        };

        let rows: Vec<Value> = self.request(Method::GET, &path, None, None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(DatabaseError::from))
            .collect()
    }

    pub async fn insert<T>(&self, table: &str, row: Value) -> Result<Vec<T>, DatabaseError>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/{}", table);
        let rows: Vec<Value> = self.request(Method::POST, &path, None, Some(row)).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(DatabaseError::from))
            .collect()
    }

    /// PATCH rows matching `filter`; returns the number of rows touched.
    pub async fn update(&self, table: &str, filter: &str, patch: Value) -> Result<usize, DatabaseError> {
        let path = format!("/rest/v1/{}?{}", table, filter);
        let rows: Option<Vec<Value>> = self.request(Method::PATCH, &path, None, Some(patch)).await?;
        Ok(rows.map(|r| r.len()).unwrap_or(0))
    }

    pub async fn delete(&self, table: &str, filter: &str) -> Result<usize, DatabaseError> {
        let path = format!("/rest/v1/{}?{}", table, filter);
        let rows: Option<Vec<Value>> = self.request(Method::DELETE, &path, None, None).await?;
        Ok(rows.map(|r| r.len()).unwrap_or(0))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

fn build_client(timeout_seconds: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds.max(1)))
        .build()
        .unwrap_or_else(|e| {
            error!("Failed to build HTTP client with timeout, using defaults: {}", e);
            Client::new()
        })
}
