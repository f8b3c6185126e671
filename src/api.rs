//! HTTP API handlers for Adpulse.
//!
//! Every data endpoint reads the active credentials from the shared
//! [`CredentialStore`] and answers with a [`ViewState`](crate::views::ViewState) body:
//!
//! - `200` with `{"state": "ready", "data": ...}` when rows came back
//! - `200` with `{"state": "empty"}` when the platform returned nothing
//! - `502` with `{"state": "error", "data": {"message": ...}}` when the
//!   primary fetch failed
//!
//! Requests without credentials get `401`, malformed parameters `400`.
//!
//! The access token is accepted on `POST /credentials` only. It is never
//! echoed back and never recorded in spans or log lines.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::aggregation::Breakdown;
use crate::credentials::CredentialStore;
use crate::daterange::{DateRange, DateSelection};
use crate::error::{CredentialError, DateRangeError};
use crate::model::{Credentials, Level};
use crate::sort::SortSpec;
use crate::views::{Dashboard, DemographicScope, ViewKind};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub credentials: CredentialStore,
    pub dashboard: Dashboard,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/credentials",
            get(get_credentials)
                .post(post_credentials)
                .delete(delete_credentials),
        )
        .route("/account", get(get_account))
        .route("/campaigns", get(get_campaigns))
        .route("/campaigns/list", get(get_campaign_list))
        .route("/campaigns/:id/adsets", get(get_campaign_adsets))
        .route("/adsets", get(get_adsets))
        .route("/ads", get(get_ads))
        .route("/demographics", get(get_demographics))
        .route("/views/:kind", get(get_view_snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body for requests that never reached a view.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Failures outside a view's own state.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no credentials configured")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Missing => ApiError::Unauthorized,
            CredentialError::Blank => ApiError::BadRequest(e.to_string()),
            CredentialError::ProbeFailed(_) => ApiError::Upstream(e.to_string()),
            CredentialError::Storage(_) => {
                warn!(error = %e, "Credential storage failed");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<DateRangeError> for ApiError {
    fn from(e: DateRangeError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

/// Query parameters shared by the view endpoints.
///
/// - `preset`: one of `today`, `yesterday`, `last7Days`, `last14Days`,
///   `last30Days` (default), `thisWeek`, `lastWeek`, `thisMonth`, `lastMonth`
/// - `since` / `until`: explicit `YYYY-MM-DD` dates, overriding `preset`
/// - `sort` / `direction`: sort field (default `impressions`) and `asc`/`desc`
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub preset: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub campaign_id: Option<String>,
    pub adset_id: Option<String>,
    pub only_active: Option<bool>,
    pub breakdown: Option<String>,
    pub level: Option<String>,
}

impl ViewQuery {
    fn range(&self) -> Result<DateRange, ApiError> {
        let selection = DateSelection::from_params(
            self.preset.as_deref(),
            self.since.as_deref(),
            self.until.as_deref(),
        )?;
        Ok(selection.resolve_now())
    }

    fn sort_spec(&self) -> SortSpec {
        SortSpec::from_params(self.sort.as_deref(), self.direction.as_deref())
    }

    fn required(value: &Option<String>, name: &str) -> Result<String, ApiError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest(format!("missing required parameter '{}'", name)))
    }

    fn optional(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn breakdown(&self) -> Result<Breakdown, ApiError> {
        match Self::optional(&self.breakdown) {
            Some(raw) => raw.parse().map_err(ApiError::BadRequest),
            None => Ok(Breakdown::Age),
        }
    }

    fn level(&self) -> Result<Option<Level>, ApiError> {
        match Self::optional(&self.level).as_deref() {
            None => Ok(None),
            Some("campaign") => Ok(Some(Level::Campaign)),
            Some("adset") => Ok(Some(Level::AdSet)),
            Some("ad") => Ok(Some(Level::Ad)),
            Some(other) => Err(ApiError::BadRequest(format!("unknown level '{}'", other))),
        }
    }
}

/// Connection status, without the token.
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// POST /credentials - Probe and save an account id / access token pair.
///
/// # Request Body
///
/// ```json
/// {
///     "account_id": "1234567890",
///     "access_token": "EAAB..."
/// }
/// ```
///
/// The account id may carry the `act_` prefix. Nothing is saved unless the
/// platform accepts the pair.
#[instrument(skip(state, credentials))]
pub async fn post_credentials(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<CredentialStatus>, ApiError> {
    let credentials = Credentials::new(credentials.account_id, credentials.access_token);
    let account_id = credentials.account_id.clone();

    let account = state
        .credentials
        .submit(credentials, state.dashboard.client())
        .await?;

    info!(account_id = %account_id, "Connected to ad account");

    Ok(Json(CredentialStatus {
        connected: true,
        account_id: Some(account_id),
        account_name: account.name,
    }))
}

/// GET /credentials - Whether credentials are configured.
#[instrument(skip(state))]
pub async fn get_credentials(State(state): State<AppState>) -> Json<CredentialStatus> {
    let account_id = state.credentials.current().await.ok().map(|c| c.account_id);
    Json(CredentialStatus {
        connected: account_id.is_some(),
        account_id,
        account_name: None,
    })
}

/// DELETE /credentials - Logout.
#[instrument(skip(state))]
pub async fn delete_credentials(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.credentials.logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /account - Ad account overview.
#[instrument(skip(state))]
pub async fn get_account(State(state): State<AppState>) -> Result<Response, ApiError> {
    let credentials = state.credentials.current().await?;
    Ok(state.dashboard.account(&credentials).await.into_response())
}

/// GET /campaigns - Campaign performance table.
#[instrument(skip(state))]
pub async fn get_campaigns(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Response, ApiError> {
    let credentials = state.credentials.current().await?;
    let range = query.range()?;
    let sort = query.sort_spec();

    let view = state.dashboard.campaigns(&credentials, range, &sort).await;
    Ok(view.into_response())
}

/// GET /campaigns/list - Campaign picker.
#[instrument(skip(state))]
pub async fn get_campaign_list(State(state): State<AppState>) -> Result<Response, ApiError> {
    let credentials = state.credentials.current().await?;
    Ok(state.dashboard.campaign_list(&credentials).await.into_response())
}

/// GET /campaigns/:id/adsets - Ad-set picker.
#[instrument(skip(state))]
pub async fn get_campaign_adsets(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Response, ApiError> {
    let credentials = state.credentials.current().await?;
    Ok(state
        .dashboard
        .adset_list(&credentials, &campaign_id)
        .await
        .into_response())
}

/// GET /adsets - Ad sets of one campaign.
///
/// # Query Parameters
///
/// - `campaign_id` (required)
/// - `only_active` (optional): keep ACTIVE ad sets only
/// - date range and sort parameters, see [`ViewQuery`]
#[instrument(skip(state))]
pub async fn get_adsets(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Response, ApiError> {
    let credentials = state.credentials.current().await?;
    let campaign_id = ViewQuery::required(&query.campaign_id, "campaign_id")?;
    let range = query.range()?;
    let sort = query.sort_spec();
    let only_active = query.only_active.unwrap_or(false);

    let view = state
        .dashboard
        .adsets(&credentials, &campaign_id, range, only_active, &sort)
        .await;
    Ok(view.into_response())
}

/// GET /ads - Ads and creatives of one ad set.
#[instrument(skip(state))]
pub async fn get_ads(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Response, ApiError> {
    let credentials = state.credentials.current().await?;
    let adset_id = ViewQuery::required(&query.adset_id, "adset_id")?;
    let range = query.range()?;
    let sort = query.sort_spec();

    let view = state
        .dashboard
        .ads(&credentials, &adset_id, range, &sort)
        .await;
    Ok(view.into_response())
}

/// GET /demographics - Audience breakdown.
///
/// # Query Parameters
///
/// - `breakdown`: `age` (default), `gender`, `country`, `region`, `device_platform`
/// - `level`: `campaign` or `adset` (defaults to the narrowest filter given)
/// - `campaign_id`, `adset_id` (optional): scope filter, ad set wins
/// - date range and sort parameters, see [`ViewQuery`]
#[instrument(skip(state))]
pub async fn get_demographics(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Response, ApiError> {
    let credentials = state.credentials.current().await?;
    let breakdown = query.breakdown()?;
    let scope = DemographicScope {
        level: query.level()?,
        campaign_id: ViewQuery::optional(&query.campaign_id),
        adset_id: ViewQuery::optional(&query.adset_id),
    };
    let range = query.range()?;
    let sort = query.sort_spec();

    let view = state
        .dashboard
        .demographics(&credentials, breakdown, &scope, range, &sort)
        .await;
    if !view.is_ready() {
        info!(breakdown = %breakdown, "Demographic view has no data to show");
    }
    Ok(view.into_response())
}

/// GET /views/:kind - Latest accepted result for a view.
#[instrument(skip(state))]
pub async fn get_view_snapshot(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Response, ApiError> {
    let kind: ViewKind = kind.parse().map_err(ApiError::BadRequest)?;

    match state.dashboard.snapshot(kind) {
        Some(snapshot) => Ok(snapshot.into_response()),
        None => Err(ApiError::NotFound(format!("no {} view requested yet", kind))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_query_defaults() {
        let query = ViewQuery::default();

        assert_eq!(query.range().unwrap().days(), 31);
        assert_eq!(query.sort_spec(), SortSpec::default());
        assert_eq!(query.breakdown().unwrap(), Breakdown::Age);
        assert_eq!(query.level().unwrap(), None);
    }

    #[test]
    fn test_view_query_rejects_bad_parameters() {
        let inverted = ViewQuery {
            since: Some("2024-02-01".to_string()),
            until: Some("2024-01-01".to_string()),
            ..ViewQuery::default()
        };
        assert!(matches!(inverted.range(), Err(ApiError::BadRequest(_))));

        let bad_breakdown = ViewQuery {
            breakdown: Some("zodiac".to_string()),
            ..ViewQuery::default()
        };
        assert!(matches!(bad_breakdown.breakdown(), Err(ApiError::BadRequest(_))));

        let bad_level = ViewQuery {
            level: Some("account".to_string()),
            ..ViewQuery::default()
        };
        assert!(matches!(bad_level.level(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_required_parameter_trims() {
        assert_eq!(
            ViewQuery::required(&Some(" 42 ".to_string()), "campaign_id").unwrap(),
            "42"
        );
        assert!(ViewQuery::required(&Some("  ".to_string()), "campaign_id").is_err());
        assert!(ViewQuery::required(&None, "campaign_id").is_err());
    }

    #[test]
    fn test_credential_errors_map_to_statuses() {
        let status = |e: CredentialError| ApiError::from(e).into_response().status();

        assert_eq!(status(CredentialError::Missing), StatusCode::UNAUTHORIZED);
        assert_eq!(status(CredentialError::Blank), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(CredentialError::ProbeFailed(crate::error::GraphError::Api {
                status: 401,
                message: "bad token".to_string(),
            })),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_api_error_messages() {
        assert_eq!(ApiError::Unauthorized.to_string(), "no credentials configured");
        assert_eq!(
            ApiError::BadRequest("missing required parameter 'adset_id'".to_string()).to_string(),
            "missing required parameter 'adset_id'"
        );
    }

    #[tokio::test]
    async fn test_unreachable_platform_body_omits_token() {
        let storage = crate::storage::Storage::new("sqlite::memory:").await.unwrap();
        let store = CredentialStore::load(storage).await.unwrap();
        let client = crate::graph::GraphClient::with_base_url("http://127.0.0.1:1", "v18.0");

        let err = store
            .submit(Credentials::new("123", "SECRET-TOKEN-XYZ"), &client)
            .await
            .unwrap_err();
        let api_error = ApiError::from(err);

        assert!(matches!(api_error, ApiError::Upstream(_)));
        assert!(!api_error.to_string().contains("SECRET-TOKEN-XYZ"));

        let response = api_error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains("SECRET-TOKEN-XYZ"));
    }
}
