//! Ads-platform Graph API client.
//!
//! Every call takes the [`Credentials`] explicitly; the client itself holds
//! no account state. Insights requests are described by an
//! [`InsightsQuery`] (time range, level, fields, breakdown, filters) and the
//! `{data, paging}` envelope is unwrapped, following `paging.next` links up
//! to a fixed page budget.
//!
//! # API Reference
//!
//! See: <https://developers.facebook.com/docs/marketing-api/insights>

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::aggregation::Breakdown;
use crate::daterange::DateRange;
use crate::error::{GraphError, GraphResult};
use crate::model::{
    AccountInfo, AdSetTargeting, AdSummary, Credentials, EntityStatus, EntitySummary, Level,
};

/// Base URL for the Graph API.
pub const GRAPH_API_BASE: &str = "https://graph.facebook.com";

/// API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "v18.0";

/// Upper bound on `paging.next` links followed for one request.
const MAX_PAGES: usize = 20;

/// Counters shared by every entity-level insights request.
const ENTITY_METRIC_FIELDS: &[&str] = &[
    "impressions",
    "reach",
    "clicks",
    "spend",
    "actions",
    "ctr",
    "cpc",
    "cpm",
    "unique_clicks",
    "frequency",
    "account_name",
    "inline_link_clicks",
    "inline_post_engagement",
    "action_values",
    "video_p25_watched_actions",
    "video_p50_watched_actions",
    "video_p75_watched_actions",
    "video_p100_watched_actions",
    "video_play_actions",
    "outbound_clicks",
    "website_purchase_roas",
    "purchase_roas",
    "quality_ranking",
    "engagement_rate_ranking",
    "conversion_rate_ranking",
    "objective",
];

/// Counters requested for breakdown insights.
const BREAKDOWN_METRIC_FIELDS: &[&str] = &["impressions", "reach", "clicks", "spend"];

/// Fields of an entity-level insights request at `level`.
pub fn entity_fields(level: Level) -> Vec<&'static str> {
    let mut fields = identity_fields(level);
    fields.extend_from_slice(ENTITY_METRIC_FIELDS);
    fields
}

/// Fields of a breakdown insights request at `level`.
pub fn breakdown_fields(level: Level) -> Vec<&'static str> {
    let mut fields = identity_fields(level);
    fields.extend_from_slice(BREAKDOWN_METRIC_FIELDS);
    fields
}

fn identity_fields(level: Level) -> Vec<&'static str> {
    match level {
        Level::Campaign => vec!["campaign_name", "campaign_id"],
        Level::AdSet => vec!["adset_name", "adset_id", "campaign_id"],
        Level::Ad => vec!["ad_name", "ad_id", "adset_id", "campaign_id"],
    }
}

/// Comparison operator of an insights filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Equal,
    In,
}

/// One `{field, operator, value}` entry of the `filtering` parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl Filter {
    pub fn equal(field: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator: FilterOperator::Equal,
            value: Value::String(value.to_string()),
        }
    }

    pub fn any_of(field: &str, values: &[String]) -> Self {
        Self {
            field: field.to_string(),
            operator: FilterOperator::In,
            value: Value::Array(values.iter().cloned().map(Value::String).collect()),
        }
    }
}

/// Parameters of one insights request.
#[derive(Debug, Clone)]
pub struct InsightsQuery {
    pub range: DateRange,
    pub level: Option<Level>,
    pub fields: Vec<String>,
    pub breakdown: Option<Breakdown>,
    pub filtering: Vec<Filter>,
}

impl InsightsQuery {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            level: None,
            fields: Vec::new(),
            breakdown: None,
            filtering: Vec::new(),
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn breakdown(mut self, breakdown: Breakdown) -> Self {
        self.breakdown = Some(breakdown);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filtering.push(filter);
        self
    }

    /// Encoded query string, without the access token.
    pub fn to_query_string(&self) -> String {
        let mut params = vec![format!(
            "time_range={}",
            urlencoding::encode(&self.range.to_time_range_param())
        )];

        if let Some(level) = self.level {
            params.push(format!("level={}", level.as_str()));
        }

        if !self.fields.is_empty() {
            params.push(format!(
                "fields={}",
                urlencoding::encode(&self.fields.join(","))
            ));
        }

        if let Some(breakdown) = self.breakdown {
            params.push(format!("breakdowns={}", breakdown.as_str()));
        }

        if !self.filtering.is_empty() {
            let filtering = serde_json::to_string(&self.filtering).unwrap_or_default();
            params.push(format!("filtering={}", urlencoding::encode(&filtering)));
        }

        params.join("&")
    }
}

/// `{data: [...], paging: {...}}` envelope.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,

    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

/// Error envelope returned with non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatusEntry {
    #[serde(default)]
    status: EntityStatus,
}

/// Extract a readable message from an error response body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ if body.trim().is_empty() => "empty response".to_string(),
        _ => body.chars().take(200).collect(),
    }
}

/// Client for the ads-platform Graph API.
#[derive(Clone)]
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
    version: String,
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphClient {
    /// Create a client against the public Graph API.
    pub fn new() -> Self {
        Self::with_base_url(GRAPH_API_BASE, DEFAULT_API_VERSION)
    }

    /// Create a client with a custom base URL and version (for testing).
    pub fn with_base_url(base_url: &str, version: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            version: version.to_string(),
        }
    }

    fn node_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.version, path)
    }

    /// GET a URL and decode the body. The token is appended when given.
    async fn fetch<T: DeserializeOwned>(&self, url: &str, token: Option<&str>) -> GraphResult<T> {
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.query(&[("access_token", token)]);
        }

        // reqwest errors print the request URL, which carries the token
        let response = request.send().await.map_err(reqwest::Error::without_url)?;
        let status = response.status();
        let body = response.text().await.map_err(reqwest::Error::without_url)?;

        if !status.is_success() {
            return Err(GraphError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch every page of a `{data, paging}` listing.
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> GraphResult<Vec<T>> {
        let mut page: Page<T> = self.fetch(url, Some(credentials.access_token.as_str())).await?;
        let mut items = std::mem::take(&mut page.data);
        let mut pages = 1;

        while let Some(next) = page.paging.as_ref().and_then(|p| p.next.clone()) {
            if pages >= MAX_PAGES {
                warn!(pages, "Page limit reached, results truncated");
                break;
            }
            // `next` links already carry the token
            page = self.fetch(&next, None).await?;
            items.append(&mut page.data);
            pages += 1;
        }

        debug!(items = items.len(), pages, "Fetched listing");
        Ok(items)
    }

    /// Get ad account metadata. Also serves as the credential probe.
    pub async fn get_account(&self, credentials: &Credentials) -> GraphResult<AccountInfo> {
        let url = format!(
            "{}?fields=name,currency,timezone_name,amount_spent,business,account_status",
            self.node_url(&credentials.account_node())
        );
        self.fetch(&url, Some(credentials.access_token.as_str())).await
    }

    /// Run an insights query against the ad account.
    pub async fn get_insights<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        query: &InsightsQuery,
    ) -> GraphResult<Vec<T>> {
        let url = format!(
            "{}/insights?{}",
            self.node_url(&credentials.account_node()),
            query.to_query_string()
        );
        self.fetch_all(&url, credentials).await
    }

    /// List the account's campaigns with their status.
    pub async fn list_campaigns(
        &self,
        credentials: &Credentials,
    ) -> GraphResult<Vec<EntitySummary>> {
        let url = format!(
            "{}/campaigns?fields=id,name,status",
            self.node_url(&credentials.account_node())
        );
        self.fetch_all(&url, credentials).await
    }

    /// List the ad sets of one campaign.
    pub async fn list_adsets(
        &self,
        credentials: &Credentials,
        campaign_id: &str,
    ) -> GraphResult<Vec<EntitySummary>> {
        let url = format!(
            "{}/adsets?fields=id,name,status",
            self.node_url(&urlencoding::encode(campaign_id))
        );
        self.fetch_all(&url, credentials).await
    }

    /// List the ads of one ad set, with creative metadata.
    pub async fn list_ads(
        &self,
        credentials: &Credentials,
        adset_id: &str,
    ) -> GraphResult<Vec<AdSummary>> {
        let url = format!(
            "{}/ads?fields={}",
            self.node_url(&urlencoding::encode(adset_id)),
            urlencoding::encode("id,name,status,creative{id,name,thumbnail_url}")
        );
        self.fetch_all(&url, credentials).await
    }

    /// Targeting specs of the account's ad sets, keyed by campaign.
    pub async fn list_adset_targeting(
        &self,
        credentials: &Credentials,
    ) -> GraphResult<Vec<AdSetTargeting>> {
        let url = format!(
            "{}/adsets?fields=campaign_id,targeting&limit=500",
            self.node_url(&credentials.account_node())
        );
        self.fetch_all(&url, credentials).await
    }

    /// Look up the status of several entities in one request.
    pub async fn get_statuses(
        &self,
        credentials: &Credentials,
        ids: &[String],
    ) -> GraphResult<HashMap<String, EntityStatus>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}?ids={}&fields=status",
            self.node_url(""),
            urlencoding::encode(&ids.join(","))
        );
        let entries: HashMap<String, StatusEntry> =
            self.fetch(&url, Some(credentials.access_token.as_str())).await?;

        Ok(entries
            .into_iter()
            .map(|(id, entry)| (id, entry.status))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> DateRange {
        DateRange::parse_custom("2024-01-01", "2024-01-31").unwrap()
    }

    fn decode(query: &str, key: &str) -> Option<String> {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| urlencoding::decode(v).unwrap().into_owned())
    }

    #[test]
    fn test_query_string_carries_all_parameters() {
        let query = InsightsQuery::new(range())
            .level(Level::Campaign)
            .fields(&["campaign_id", "impressions"])
            .breakdown(Breakdown::Age)
            .filter(Filter::equal("campaign.id", "42"))
            .to_query_string();

        let time_range: Value = serde_json::from_str(&decode(&query, "time_range").unwrap()).unwrap();
        assert_eq!(time_range["since"], "2024-01-01");
        assert_eq!(time_range["until"], "2024-01-31");
        assert_eq!(decode(&query, "level").as_deref(), Some("campaign"));
        assert_eq!(decode(&query, "fields").as_deref(), Some("campaign_id,impressions"));
        assert_eq!(decode(&query, "breakdowns").as_deref(), Some("age"));

        let filtering: Value = serde_json::from_str(&decode(&query, "filtering").unwrap()).unwrap();
        assert_eq!(
            filtering,
            serde_json::json!([{"field": "campaign.id", "operator": "EQUAL", "value": "42"}])
        );
    }

    #[test]
    fn test_query_string_omits_unset_parameters() {
        let query = InsightsQuery::new(range()).to_query_string();

        assert!(query.starts_with("time_range="));
        assert!(decode(&query, "level").is_none());
        assert!(decode(&query, "breakdowns").is_none());
        assert!(decode(&query, "filtering").is_none());
    }

    #[test]
    fn test_in_filter_serializes_list() {
        let filter = Filter::any_of("ad.id", &["1".to_string(), "2".to_string()]);
        let value = serde_json::to_value(&filter).unwrap();

        assert_eq!(value["operator"], "IN");
        assert_eq!(value["value"], serde_json::json!(["1", "2"]));
    }

    #[test]
    fn test_field_lists_include_identity() {
        let campaign = entity_fields(Level::Campaign);
        assert!(campaign.contains(&"campaign_id"));
        assert!(campaign.contains(&"inline_post_engagement"));

        let adset = breakdown_fields(Level::AdSet);
        assert_eq!(&adset[..2], &["adset_name", "adset_id"]);
        assert!(adset.contains(&"spend"));
        assert!(!adset.contains(&"actions"));
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#;
        assert_eq!(error_message(body), "Invalid OAuth access token.");
        assert_eq!(error_message(""), "empty response");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_node_url_strips_trailing_slash() {
        let client = GraphClient::with_base_url("http://localhost:9999/", "v22.0");
        assert_eq!(client.node_url("act_1"), "http://localhost:9999/v22.0/act_1");
    }
}
