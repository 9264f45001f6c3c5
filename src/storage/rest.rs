//! PostgREST-backed data store
//!
//! Talks to `<provider>/rest/v1/<table>`. Caller-scoped calls send the public
//! key plus the caller's bearer token; service calls send the elevated key
//! and fail when it is not configured.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::traits::*;
use crate::config::ServerConfig;
use crate::error::{GymTrackerError, Result};

/// Data store over the provider's REST interface
pub struct PostgrestStore {
    rest_url: Url,
    public_key: String,
    service_key: Option<String>,
    http: Client,
}

impl PostgrestStore {
    /// Create a store from the server configuration
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let rest_url = config.provider_url.join("rest/v1/").map_err(|e| {
            GymTrackerError::ConfigError(format!("Cannot derive REST URL: {}", e))
        })?;
        let http = Client::builder()
            .timeout(config.provider_timeout)
            .connect_timeout(config.provider_timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| GymTrackerError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            rest_url,
            public_key: config.provider_public_key.clone(),
            service_key: config.provider_service_key.clone(),
            http,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.rest_url
            .join(table)
            .map_err(|e| GymTrackerError::Storage(format!("Invalid table '{}': {}", table, e)))
    }

    /// Attach the headers for the chosen credential
    fn authorize(&self, request: RequestBuilder, auth: &StoreAuth) -> Result<RequestBuilder> {
        match auth {
            StoreAuth::Caller(token) => Ok(request
                .header("apikey", &self.public_key)
                .bearer_auth(token)),
            StoreAuth::Service => {
                let key = self.service_key.as_ref().ok_or_else(|| {
                    GymTrackerError::ConfigError(
                        "SUPABASE_SERVICE_ROLE_KEY is required for admin data access".to_string(),
                    )
                })?;
                Ok(request.header("apikey", key).bearer_auth(key))
            }
        }
    }

    async fn read_rows(response: Response, table: &str) -> Result<Vec<Value>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::debug!("Data store error on {} ({}): {}", table, status, body);
            return Err(GymTrackerError::Storage(format!(
                "{} request failed with status {}",
                table, status
            )));
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row => Ok(vec![row]),
        }
    }
}

/// Render filters as PostgREST query parameters
pub fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| match filter {
            Filter::Eq(column, value) => (column.clone(), format!("eq.{}", value)),
            Filter::In(column, values) => {
                let quoted: Vec<String> = values
                    .iter()
                    .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
                    .collect();
                (column.clone(), format!("in.({})", quoted.join(",")))
            }
            Filter::Search(columns, term) => {
                let any: Vec<String> = columns
                    .iter()
                    .map(|column| format!("{}.ilike.*{}*", column, term))
                    .collect();
                ("or".to_string(), format!("({})", any.join(",")))
            }
        })
        .collect()
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`
pub fn parse_content_range_total(value: &str) -> Option<usize> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

/// Render a full select query as PostgREST query parameters
pub fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters));
    if let Some(ref order) = query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    params
}

#[async_trait]
impl DataStore for PostgrestStore {
    async fn select(&self, table: &str, query: &Query, auth: StoreAuth) -> Result<Vec<Value>> {
        let request = self
            .http
            .get(self.table_url(table)?)
            .query(&query_params(query));
        let response = self.authorize(request, &auth)?.send().await?;
        Self::read_rows(response, table).await
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        on_conflict: OnConflict,
        auth: StoreAuth,
    ) -> Result<Vec<Value>> {
        let mut request = self.http.post(self.table_url(table)?).json(&row);
        request = match on_conflict {
            OnConflict::Fail => request.header("Prefer", "return=representation"),
            OnConflict::Ignore => request
                .query(&[("on_conflict", "id")])
                .header("Prefer", "resolution=ignore-duplicates,return=representation"),
        };
        let response = self.authorize(request, &auth)?.send().await?;
        Self::read_rows(response, table).await
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
        auth: StoreAuth,
    ) -> Result<Vec<Value>> {
        if filters.is_empty() {
            return Err(GymTrackerError::Validation(
                "Refusing to update without a filter".to_string(),
            ));
        }
        let request = self
            .http
            .patch(self.table_url(table)?)
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        let response = self.authorize(request, &auth)?.send().await?;
        Self::read_rows(response, table).await
    }

    async fn delete(&self, table: &str, filters: &[Filter], auth: StoreAuth) -> Result<usize> {
        if filters.is_empty() {
            return Err(GymTrackerError::Validation(
                "Refusing to delete without a filter".to_string(),
            ));
        }
        let request = self
            .http
            .delete(self.table_url(table)?)
            .query(&filter_params(filters))
            .header("Prefer", "return=representation");
        let response = self.authorize(request, &auth)?.send().await?;
        Ok(Self::read_rows(response, table).await?.len())
    }

    async fn count(&self, table: &str, filters: &[Filter], auth: StoreAuth) -> Result<usize> {
        let request = self
            .http
            .head(self.table_url(table)?)
            .query(&filter_params(filters))
            .header("Prefer", "count=exact");
        let response = self.authorize(request, &auth)?.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GymTrackerError::Storage(format!(
                "{} count failed with status {}",
                table, status
            )));
        }
        response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                GymTrackerError::Storage(format!("{} count returned no Content-Range total", table))
            })
    }

    fn store_name(&self) -> &'static str {
        "POSTGREST"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params() {
        let query = Query::new()
            .filter(Filter::eq("user_id", "u1"))
            .filter(Filter::is_in("id", vec!["a".to_string(), "b".to_string()]))
            .order_by("created_at", false)
            .limit(5);
        let params = query_params(&query);
        assert_eq!(params[0], ("select".to_string(), "*".to_string()));
        assert!(params.contains(&("user_id".to_string(), "eq.u1".to_string())));
        assert!(params.contains(&("id".to_string(), "in.(\"a\",\"b\")".to_string())));
        assert!(params.contains(&("order".to_string(), "created_at.desc".to_string())));
        assert!(params.contains(&("limit".to_string(), "5".to_string())));
    }

    #[test]
    fn test_search_and_offset_params() {
        let query = Query::new()
            .filter(Filter::search(&["email", "full_name"], "Ada L").unwrap())
            .offset(40);
        let params = query_params(&query);
        assert!(params.contains(&(
            "or".to_string(),
            "(email.ilike.*ada l*,full_name.ilike.*ada l*)".to_string()
        )));
        assert!(params.contains(&("offset".to_string(), "40".to_string())));
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[tokio::test]
    async fn test_service_auth_requires_service_key() {
        let mut config = ServerConfig::for_testing("http://127.0.0.1:9").unwrap();
        config.provider_service_key = None;
        let store = PostgrestStore::new(&config).unwrap();
        let result = store
            .select("user_profiles", &Query::new(), StoreAuth::Service)
            .await;
        assert!(matches!(result, Err(GymTrackerError::ConfigError(_))));
    }
}
