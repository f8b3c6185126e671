//! View orchestration.
//!
//! Each view fetches its primary insights, joins secondary metadata
//! (statuses, targeting, creatives), runs the metric formulas and returns an
//! explicit [`ViewState`]. A failed primary fetch turns the whole view into
//! [`ViewState::Error`]; a failed enrichment only adds an
//! [`EnrichmentWarning`] and falls back to `UNKNOWN` status or omitted
//! targeting.
//!
//! Results are also published to a [`RequestSequencer`], which keeps the
//! latest accepted snapshot per [`ViewKind`] and drops responses that were
//! overtaken by a newer request of the same kind.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::aggregation::{Breakdown, DemographicReport, build_report};
use crate::daterange::DateRange;
use crate::error::GraphResult;
use crate::graph::{
    DEFAULT_API_VERSION, Filter, GRAPH_API_BASE, GraphClient, InsightsQuery, breakdown_fields,
    entity_fields,
};
use crate::metrics::{
    CURRENCY_SYMBOL, CostPerConversion, DEFAULT_LEAD_VALUE, EntityMetrics, Totals, format_amount,
    format_number, format_objective, format_percentage, format_ranking,
};
use crate::model::{
    AccountInfo, AdSetTargeting, AdSummary, BreakdownRow, CreativeSummary, Credentials,
    EntityStatus, EntitySummary, Level, MetricRow, TargetingSummary,
};
use crate::sort::{SortSpec, SortValue, Sortable, sort_rows};

/// Dashboard configuration.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Graph API base URL.
    pub graph_url: String,

    /// Graph API version segment, e.g. `v18.0`.
    pub graph_version: String,

    /// Assumed value of one lead for the ROAS estimate.
    pub lead_value: f64,

    /// Symbol used in formatted amounts.
    pub currency: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            graph_url: GRAPH_API_BASE.to_string(),
            graph_version: DEFAULT_API_VERSION.to_string(),
            lead_value: DEFAULT_LEAD_VALUE,
            currency: CURRENCY_SYMBOL.to_string(),
        }
    }
}

/// Display state of a view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum ViewState<T> {
    /// A request is in flight and nothing has been accepted yet.
    Loading,
    /// The primary fetch failed.
    Error { message: String },
    /// The fetch succeeded but returned no rows.
    Empty,
    Ready(T),
}

impl<T> ViewState<T> {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ViewState::Error { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::OK,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ViewState::Ready(_))
    }
}

impl<T: Serialize> ViewState<T> {
    /// Erase the payload type for snapshot storage.
    fn to_snapshot(&self) -> ViewState<Value> {
        match self {
            ViewState::Loading => ViewState::Loading,
            ViewState::Error { message } => ViewState::Error {
                message: message.clone(),
            },
            ViewState::Empty => ViewState::Empty,
            ViewState::Ready(data) => match serde_json::to_value(data) {
                Ok(value) => ViewState::Ready(value),
                Err(e) => ViewState::Error {
                    message: e.to_string(),
                },
            },
        }
    }
}

impl<T> From<GraphResult<Option<T>>> for ViewState<T> {
    fn from(result: GraphResult<Option<T>>) -> Self {
        match result {
            Ok(Some(data)) => ViewState::Ready(data),
            Ok(None) => ViewState::Empty,
            Err(e) => ViewState::Error {
                message: e.to_string(),
            },
        }
    }
}

impl<T: Serialize> IntoResponse for ViewState<T> {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// A secondary lookup that failed without failing the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentWarning {
    pub enrichment: String,
    pub message: String,
}

impl EnrichmentWarning {
    fn new(enrichment: &str, error: impl fmt::Display) -> Self {
        warn!(enrichment, error = %error, "Enrichment lookup failed");
        Self {
            enrichment: enrichment.to_string(),
            message: error.to_string(),
        }
    }
}

/// Table cells, already formatted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayValues {
    pub impressions: String,
    pub reach: String,
    pub clicks: String,
    pub spend: String,
    pub ctr: String,
    pub cpc: String,
    pub engagement_rate: String,
    pub conversion_rate: String,
    pub cost_per_conversion: String,
    pub roas: String,
    pub video_completion_rate: String,
    pub objective: String,
    pub quality_ranking: &'static str,
    pub engagement_rate_ranking: &'static str,
    pub conversion_rate_ranking: &'static str,
}

impl DisplayValues {
    fn new(row: &MetricRow, metrics: &EntityMetrics, currency: &str) -> Self {
        let cost_per_conversion = match metrics.cost_per_conversion {
            CostPerConversion::Amount(v) => format_amount(currency, v),
            CostPerConversion::NotAvailable => CostPerConversion::NotAvailable.to_string(),
        };

        Self {
            impressions: format_number(row.impressions as f64),
            reach: format_number(row.reach as f64),
            clicks: format_number(row.clicks as f64),
            spend: format_amount(currency, row.spend),
            ctr: format_percentage(metrics.ctr),
            cpc: format_amount(currency, metrics.cpc),
            engagement_rate: format_percentage(metrics.engagement_rate),
            conversion_rate: format_percentage(metrics.conversion_rate),
            cost_per_conversion,
            roas: format!("{:.2}x", metrics.roas),
            video_completion_rate: metrics
                .video_completion_rate
                .map(format_percentage)
                .unwrap_or_else(|| "N/A".to_string()),
            objective: format_objective(row.objective.as_deref()),
            quality_ranking: format_ranking(row.quality_ranking),
            engagement_rate_ranking: format_ranking(row.engagement_rate_ranking),
            conversion_rate_ranking: format_ranking(row.conversion_rate_ranking),
        }
    }
}

/// One campaign, ad set or ad with its derived metrics.
#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    #[serde(flatten)]
    pub row: MetricRow,
    pub metrics: EntityMetrics,
    pub display: DisplayValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creative: Option<CreativeSummary>,
}

impl EntityReport {
    pub fn new(row: MetricRow, lead_value: f64, currency: &str) -> Self {
        let metrics = EntityMetrics::compute(&row, lead_value);
        let display = DisplayValues::new(&row, &metrics, currency);
        Self {
            row,
            metrics,
            display,
            creative: None,
        }
    }
}

impl Sortable for EntityReport {
    fn sort_value(&self, field: &str) -> Option<SortValue> {
        let m = &self.metrics;
        let value = match field {
            "ctr" => m.ctr.into(),
            "cpc" => m.cpc.into(),
            "cpm" => m.cpm.into(),
            "frequency" => m.frequency.into(),
            "engagement_rate" => m.engagement_rate.into(),
            "conversions" => m.conversions.into(),
            "conversion_rate" => m.conversion_rate.into(),
            "cost_per_conversion" => m.cost_per_conversion.amount()?.into(),
            "cost_per_lead" => m.cost_per_lead.into(),
            "roas" => m.roas.into(),
            "quality_score" => m.quality_score.into(),
            "video_completion_rate" => m.video_completion_rate?.into(),
            _ => return self.row.sort_value(field),
        };
        Some(value)
    }
}

/// Campaign table plus the pickers and totals shown around it.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignView {
    pub range: DateRange,
    pub range_label: String,
    pub sort: SortSpec,
    pub totals: Totals,
    pub rows: Vec<EntityReport>,
    pub active_campaigns: Vec<EntitySummary>,
    pub warnings: Vec<EnrichmentWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdSetView {
    pub campaign_id: String,
    pub range: DateRange,
    pub range_label: String,
    pub only_active: bool,
    pub sort: SortSpec,
    pub totals: Totals,
    pub rows: Vec<EntityReport>,
    pub warnings: Vec<EnrichmentWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdView {
    pub adset_id: String,
    pub range: DateRange,
    pub range_label: String,
    pub sort: SortSpec,
    pub totals: Totals,
    pub rows: Vec<EntityReport>,
}

/// Which entity a demographic breakdown is scoped to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemographicScope {
    pub level: Option<Level>,
    pub campaign_id: Option<String>,
    pub adset_id: Option<String>,
}

impl DemographicScope {
    /// The ad-set filter wins when both ids are given.
    pub fn filter(&self) -> Option<Filter> {
        match (&self.adset_id, &self.campaign_id) {
            (Some(adset), _) => Some(Filter::equal("adset.id", adset)),
            (None, Some(campaign)) => Some(Filter::equal("campaign.id", campaign)),
            (None, None) => None,
        }
    }

    pub fn level(&self) -> Level {
        self.level.unwrap_or(if self.adset_id.is_some() {
            Level::AdSet
        } else {
            Level::Campaign
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DemographicView {
    pub range: DateRange,
    pub range_label: String,
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adset_id: Option<String>,
    pub sort: SortSpec,
    #[serde(flatten)]
    pub report: DemographicReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub account: AccountInfo,
    pub status_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_spent_total: Option<f64>,
    pub amount_spent_display: String,
}

/// View kinds with a retained snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Account,
    Campaigns,
    AdSets,
    Ads,
    Demographics,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Account => "account",
            ViewKind::Campaigns => "campaigns",
            ViewKind::AdSets => "adsets",
            ViewKind::Ads => "ads",
            ViewKind::Demographics => "demographics",
        }
    }
}

impl FromStr for ViewKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "account" => Ok(ViewKind::Account),
            "campaigns" => Ok(ViewKind::Campaigns),
            "adsets" | "ad-sets" | "ad_sets" => Ok(ViewKind::AdSets),
            "ads" => Ok(ViewKind::Ads),
            "demographics" => Ok(ViewKind::Demographics),
            other => Err(format!("unknown view '{}'", other)),
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle for one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub kind: ViewKind,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct Slot {
    accepted: u64,
    snapshot: Option<ViewState<Value>>,
}

/// Monotonic request tagging per view kind.
///
/// A response is accepted only if its generation is newer than the last
/// accepted one for the same kind, so a slow earlier request can never
/// overwrite the result of a later one.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    counter: AtomicU64,
    slots: Mutex<HashMap<ViewKind, Slot>>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a new request.
    pub fn begin(&self, kind: ViewKind) -> Ticket {
        let generation = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(kind).or_default();
        Ticket { kind, generation }
    }

    /// Offer a finished result. Returns `false` if it was stale and dropped.
    pub fn publish<T: Serialize>(&self, ticket: Ticket, state: &ViewState<T>) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.entry(ticket.kind).or_default();

        if ticket.generation <= slot.accepted {
            debug!(
                view = %ticket.kind,
                generation = ticket.generation,
                accepted = slot.accepted,
                "Discarding stale response"
            );
            return false;
        }

        slot.accepted = ticket.generation;
        slot.snapshot = Some(state.to_snapshot());
        true
    }

    /// Latest accepted state, `Loading` while the first request is in flight,
    /// `None` if nothing was ever requested.
    pub fn snapshot(&self, kind: ViewKind) -> Option<ViewState<Value>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots.get(&kind)?;
        Some(slot.snapshot.clone().unwrap_or(ViewState::Loading))
    }
}

/// First ad set's targeting per campaign.
fn targeting_by_campaign(entries: Vec<AdSetTargeting>) -> HashMap<String, TargetingSummary> {
    let mut map = HashMap::new();
    for entry in entries {
        if let (Some(campaign_id), Some(targeting)) = (entry.campaign_id, entry.targeting) {
            map.entry(campaign_id)
                .or_insert_with(|| targeting.summary());
        }
    }
    map
}

/// Join statuses by entity id; rows without a match stay `UNKNOWN`.
fn apply_statuses(rows: &mut [MetricRow], level: Level, statuses: &HashMap<String, EntityStatus>) {
    for row in rows {
        row.status = row
            .entity_id(level)
            .and_then(|id| statuses.get(id).copied())
            .unwrap_or_default();
    }
}

fn unique_ids(rows: &[MetricRow], level: Level) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in rows.iter().filter_map(|r| r.entity_id(level)) {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Entry point for all views.
#[derive(Clone)]
pub struct Dashboard {
    config: Arc<DashboardConfig>,
    client: GraphClient,
    sequencer: Arc<RequestSequencer>,
}

impl Dashboard {
    /// Create a new dashboard with the given configuration.
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            client: GraphClient::with_base_url(&config.graph_url, &config.graph_version),
            config: Arc::new(config),
            sequencer: Arc::new(RequestSequencer::new()),
        }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    pub fn snapshot(&self, kind: ViewKind) -> Option<ViewState<Value>> {
        self.sequencer.snapshot(kind)
    }

    /// Run a view fetch under a sequencer ticket.
    async fn sequenced<T, F>(&self, kind: ViewKind, fetch: F) -> ViewState<T>
    where
        T: Serialize,
        F: Future<Output = GraphResult<Option<T>>>,
    {
        let ticket = self.sequencer.begin(kind);
        let state = ViewState::from(fetch.await);

        if let ViewState::Error { message } = &state {
            warn!(view = %kind, error = %message, "View fetch failed");
        }
        self.sequencer.publish(ticket, &state);
        state
    }

    fn reports(&self, rows: Vec<MetricRow>) -> Vec<EntityReport> {
        rows.into_iter()
            .map(|row| EntityReport::new(row, self.config.lead_value, &self.config.currency))
            .collect()
    }

    /// Account overview.
    pub async fn account(&self, credentials: &Credentials) -> ViewState<AccountView> {
        self.sequenced(ViewKind::Account, self.fetch_account(credentials))
            .await
    }

    async fn fetch_account(&self, credentials: &Credentials) -> GraphResult<Option<AccountView>> {
        let account = self.client.get_account(credentials).await?;
        let amount_spent_total = account.amount_spent_major();
        let amount_spent_display = match amount_spent_total {
            Some(amount) => format_amount(&self.config.currency, amount),
            None => "N/A".to_string(),
        };

        Ok(Some(AccountView {
            status_label: account.status_label().to_string(),
            amount_spent_total,
            amount_spent_display,
            account,
        }))
    }

    /// Campaign-level insights with statuses and targeting joined in.
    pub async fn campaigns(
        &self,
        credentials: &Credentials,
        range: DateRange,
        sort: &SortSpec,
    ) -> ViewState<CampaignView> {
        self.sequenced(
            ViewKind::Campaigns,
            self.fetch_campaigns(credentials, range, sort),
        )
        .await
    }

    async fn fetch_campaigns(
        &self,
        credentials: &Credentials,
        range: DateRange,
        sort: &SortSpec,
    ) -> GraphResult<Option<CampaignView>> {
        let query = InsightsQuery::new(range)
            .level(Level::Campaign)
            .fields(&entity_fields(Level::Campaign));

        let (insights, campaigns, targeting) = tokio::join!(
            self.client.get_insights::<MetricRow>(credentials, &query),
            self.client.list_campaigns(credentials),
            self.client.list_adset_targeting(credentials),
        );

        let mut rows = insights?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut warnings = Vec::new();

        let campaigns = match campaigns {
            Ok(list) => list,
            Err(e) => {
                warnings.push(EnrichmentWarning::new("campaign_status", e));
                Vec::new()
            }
        };
        let statuses: HashMap<String, EntityStatus> =
            campaigns.iter().map(|c| (c.id.clone(), c.status)).collect();
        apply_statuses(&mut rows, Level::Campaign, &statuses);

        match targeting {
            Ok(entries) => {
                let by_campaign = targeting_by_campaign(entries);
                for row in &mut rows {
                    row.targeting = row
                        .campaign_id
                        .as_ref()
                        .and_then(|id| by_campaign.get(id))
                        .cloned();
                }
            }
            Err(e) => warnings.push(EnrichmentWarning::new("targeting", e)),
        }

        let totals = Totals::from_rows(&rows);
        let mut reports = self.reports(rows);
        sort_rows(&mut reports, sort);

        let active_campaigns = campaigns
            .into_iter()
            .filter(|c| c.status == EntityStatus::Active)
            .collect();

        info!(
            campaigns = reports.len(),
            warnings = warnings.len(),
            since = %range.since_str(),
            until = %range.until_str(),
            "Campaign view built"
        );

        Ok(Some(CampaignView {
            range,
            range_label: range.label(),
            sort: sort.clone(),
            totals,
            rows: reports,
            active_campaigns,
            warnings,
        }))
    }

    /// Ad-set insights for one campaign.
    pub async fn adsets(
        &self,
        credentials: &Credentials,
        campaign_id: &str,
        range: DateRange,
        only_active: bool,
        sort: &SortSpec,
    ) -> ViewState<AdSetView> {
        self.sequenced(
            ViewKind::AdSets,
            self.fetch_adsets(credentials, campaign_id, range, only_active, sort),
        )
        .await
    }

    async fn fetch_adsets(
        &self,
        credentials: &Credentials,
        campaign_id: &str,
        range: DateRange,
        only_active: bool,
        sort: &SortSpec,
    ) -> GraphResult<Option<AdSetView>> {
        let query = InsightsQuery::new(range)
            .level(Level::AdSet)
            .fields(&entity_fields(Level::AdSet))
            .filter(Filter::equal("campaign.id", campaign_id));

        let mut rows: Vec<MetricRow> = self.client.get_insights(credentials, &query).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut warnings = Vec::new();
        let ids = unique_ids(&rows, Level::AdSet);
        let statuses = match self.client.get_statuses(credentials, &ids).await {
            Ok(statuses) => statuses,
            Err(e) => {
                warnings.push(EnrichmentWarning::new("adset_status", e));
                HashMap::new()
            }
        };
        apply_statuses(&mut rows, Level::AdSet, &statuses);

        if only_active {
            rows.retain(|r| r.status == EntityStatus::Active);
        }

        let totals = Totals::from_rows(&rows);
        let mut reports = self.reports(rows);
        sort_rows(&mut reports, sort);

        info!(
            campaign_id,
            adsets = reports.len(),
            only_active,
            "Ad set view built"
        );

        Ok(Some(AdSetView {
            campaign_id: campaign_id.to_string(),
            range,
            range_label: range.label(),
            only_active,
            sort: sort.clone(),
            totals,
            rows: reports,
            warnings,
        }))
    }

    /// Ad insights for one ad set, with creative metadata.
    pub async fn ads(
        &self,
        credentials: &Credentials,
        adset_id: &str,
        range: DateRange,
        sort: &SortSpec,
    ) -> ViewState<AdView> {
        self.sequenced(
            ViewKind::Ads,
            self.fetch_ads(credentials, adset_id, range, sort),
        )
        .await
    }

    async fn fetch_ads(
        &self,
        credentials: &Credentials,
        adset_id: &str,
        range: DateRange,
        sort: &SortSpec,
    ) -> GraphResult<Option<AdView>> {
        let ads = self.client.list_ads(credentials, adset_id).await?;
        if ads.is_empty() {
            debug!(adset_id, "Ad set has no ads, skipping insights");
            return Ok(None);
        }

        let ids: Vec<String> = ads.iter().map(|a| a.id.clone()).collect();
        let query = InsightsQuery::new(range)
            .level(Level::Ad)
            .fields(&entity_fields(Level::Ad))
            .filter(Filter::any_of("ad.id", &ids));

        let rows: Vec<MetricRow> = self.client.get_insights(credentials, &query).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let by_id: HashMap<&str, &AdSummary> = ads.iter().map(|a| (a.id.as_str(), a)).collect();
        let totals = Totals::from_rows(&rows);
        let mut reports: Vec<EntityReport> = rows
            .into_iter()
            .map(|mut row| {
                let ad = row.ad_id.as_deref().and_then(|id| by_id.get(id)).copied();
                row.status = ad.map(|a| a.status).unwrap_or_default();
                if row.ad_name.is_none() {
                    row.ad_name = ad.map(|a| a.name.clone());
                }
                let mut report =
                    EntityReport::new(row, self.config.lead_value, &self.config.currency);
                report.creative = ad.and_then(|a| a.creative.clone());
                report
            })
            .collect();
        sort_rows(&mut reports, sort);

        info!(adset_id, ads = reports.len(), "Ad view built");

        Ok(Some(AdView {
            adset_id: adset_id.to_string(),
            range,
            range_label: range.label(),
            sort: sort.clone(),
            totals,
            rows: reports,
        }))
    }

    /// Audience breakdown for the account, a campaign or an ad set.
    pub async fn demographics(
        &self,
        credentials: &Credentials,
        breakdown: Breakdown,
        scope: &DemographicScope,
        range: DateRange,
        sort: &SortSpec,
    ) -> ViewState<DemographicView> {
        self.sequenced(
            ViewKind::Demographics,
            self.fetch_demographics(credentials, breakdown, scope, range, sort),
        )
        .await
    }

    async fn fetch_demographics(
        &self,
        credentials: &Credentials,
        breakdown: Breakdown,
        scope: &DemographicScope,
        range: DateRange,
        sort: &SortSpec,
    ) -> GraphResult<Option<DemographicView>> {
        let level = scope.level();
        let mut query = InsightsQuery::new(range)
            .level(level)
            .fields(&breakdown_fields(level))
            .breakdown(breakdown);
        if let Some(filter) = scope.filter() {
            query = query.filter(filter);
        }

        let rows: Vec<BreakdownRow> = self.client.get_insights(credentials, &query).await?;
        let Some(mut report) = build_report(&rows, breakdown) else {
            return Ok(None);
        };
        sort_rows(&mut report.buckets, sort);

        info!(
            breakdown = %breakdown,
            rows = rows.len(),
            buckets = report.buckets.len(),
            "Demographic view built"
        );

        Ok(Some(DemographicView {
            range,
            range_label: range.label(),
            level,
            campaign_id: scope.campaign_id.clone(),
            adset_id: scope.adset_id.clone(),
            sort: sort.clone(),
            report,
        }))
    }

    /// Campaign picker.
    pub async fn campaign_list(&self, credentials: &Credentials) -> ViewState<Vec<EntitySummary>> {
        let result = self.client.list_campaigns(credentials).await;
        ViewState::from(result.map(|list| (!list.is_empty()).then_some(list)))
    }

    /// Ad-set picker for one campaign.
    pub async fn adset_list(
        &self,
        credentials: &Credentials,
        campaign_id: &str,
    ) -> ViewState<Vec<EntitySummary>> {
        let result = self.client.list_adsets(credentials, campaign_id).await;
        ViewState::from(result.map(|list| (!list.is_empty()).then_some(list)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::model::Targeting;
    use crate::sort::SortDirection;

    fn row(id: &str, impressions: u64) -> MetricRow {
        MetricRow {
            campaign_id: Some(id.to_string()),
            campaign_name: Some(format!("Campaign {}", id)),
            impressions,
            ..MetricRow::default()
        }
    }

    #[test]
    fn test_view_state_from_result() {
        let ok: GraphResult<Option<u32>> = Ok(Some(3));
        let ready = ViewState::from(ok);
        assert_eq!(ready, ViewState::Ready(3));
        assert_eq!(ready.status_code(), StatusCode::OK);

        let none: GraphResult<Option<u32>> = Ok(None);
        let empty = ViewState::from(none);
        assert_eq!(empty, ViewState::Empty);

        let err: GraphResult<Option<u32>> = Err(GraphError::Api {
            status: 400,
            message: "Invalid parameter".to_string(),
        });
        let failed = ViewState::from(err);
        assert_eq!(failed.status_code(), StatusCode::BAD_GATEWAY);
        assert!(matches!(failed, ViewState::Error { ref message } if message.contains("Invalid parameter")));
    }

    #[test]
    fn test_view_state_serialization() {
        let ready = serde_json::to_value(ViewState::Ready(vec![1, 2])).unwrap();
        assert_eq!(ready, serde_json::json!({"state": "ready", "data": [1, 2]}));

        let empty = serde_json::to_value(ViewState::<u8>::Empty).unwrap();
        assert_eq!(empty, serde_json::json!({"state": "empty"}));

        let error = serde_json::to_value(ViewState::<u8>::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(error["state"], "error");
        assert_eq!(error["data"]["message"], "boom");
    }

    #[test]
    fn test_sequencer_discards_stale_response() {
        let sequencer = RequestSequencer::new();
        let first = sequencer.begin(ViewKind::Campaigns);
        let second = sequencer.begin(ViewKind::Campaigns);

        assert_eq!(
            sequencer.snapshot(ViewKind::Campaigns),
            Some(ViewState::Loading)
        );

        // The later request finishes first
        assert!(sequencer.publish(second, &ViewState::Ready("new")));
        assert!(!sequencer.publish(first, &ViewState::Ready("old")));

        assert_eq!(
            sequencer.snapshot(ViewKind::Campaigns),
            Some(ViewState::Ready(Value::from("new")))
        );
    }

    #[test]
    fn test_sequencer_accepts_in_order_responses() {
        let sequencer = RequestSequencer::new();
        let first = sequencer.begin(ViewKind::Ads);
        let second = sequencer.begin(ViewKind::Ads);

        assert!(sequencer.publish(first, &ViewState::<u8>::Empty));
        assert_eq!(sequencer.snapshot(ViewKind::Ads), Some(ViewState::Empty));
        assert!(sequencer.publish(second, &ViewState::Ready(7)));

        assert_eq!(
            sequencer.snapshot(ViewKind::Ads),
            Some(ViewState::Ready(Value::from(7)))
        );
    }

    #[test]
    fn test_sequencer_kinds_are_independent() {
        let sequencer = RequestSequencer::new();
        let ads = sequencer.begin(ViewKind::Ads);
        let campaigns = sequencer.begin(ViewKind::Campaigns);

        assert!(sequencer.publish(campaigns, &ViewState::Ready(1)));
        assert!(sequencer.publish(ads, &ViewState::Ready(2)));
        assert!(sequencer.snapshot(ViewKind::Demographics).is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_message_omits_token() {
        let dashboard = Dashboard::new(DashboardConfig {
            graph_url: "http://127.0.0.1:1".to_string(),
            ..DashboardConfig::default()
        });
        let credentials = Credentials::new("123", "SECRET-TOKEN-XYZ");
        let range = DateRange::parse_custom("2024-01-01", "2024-01-31").unwrap();

        let view = dashboard
            .campaigns(&credentials, range, &SortSpec::default())
            .await;
        assert!(matches!(
            &view,
            ViewState::Error { message } if !message.contains("SECRET-TOKEN-XYZ")
        ));

        let snapshot = serde_json::to_string(&dashboard.snapshot(ViewKind::Campaigns)).unwrap();
        assert!(snapshot.contains("error"));
        assert!(!snapshot.contains("SECRET-TOKEN-XYZ"));
    }

    #[test]
    fn test_view_kind_parsing() {
        assert_eq!("adsets".parse::<ViewKind>(), Ok(ViewKind::AdSets));
        assert_eq!("Ad-Sets".parse::<ViewKind>(), Ok(ViewKind::AdSets));
        assert_eq!("demographics".parse::<ViewKind>(), Ok(ViewKind::Demographics));
        assert!("reports".parse::<ViewKind>().is_err());
    }

    #[test]
    fn test_missing_statuses_fall_back_to_unknown() {
        let mut rows = vec![row("1", 10), row("2", 20)];
        let statuses = HashMap::from([("1".to_string(), EntityStatus::Active)]);

        apply_statuses(&mut rows, Level::Campaign, &statuses);

        assert_eq!(rows[0].status, EntityStatus::Active);
        assert_eq!(rows[1].status, EntityStatus::Unknown);
    }

    #[test]
    fn test_targeting_uses_first_adset_per_campaign() {
        let entries = vec![
            AdSetTargeting {
                campaign_id: Some("1".to_string()),
                targeting: Some(Targeting {
                    age_min: Some(18),
                    age_max: Some(24),
                    genders: Some(vec![2]),
                }),
            },
            AdSetTargeting {
                campaign_id: Some("1".to_string()),
                targeting: Some(Targeting::default()),
            },
            AdSetTargeting {
                campaign_id: None,
                targeting: Some(Targeting::default()),
            },
        ];

        let map = targeting_by_campaign(entries);
        assert_eq!(map.len(), 1);
        assert_eq!(map["1"].age, "18-24");
        assert_eq!(map["1"].gender, "Women");
    }

    #[test]
    fn test_unique_ids_keep_first_seen_order() {
        let rows = vec![row("b", 1), row("a", 1), row("b", 2)];
        assert_eq!(unique_ids(&rows, Level::Campaign), vec!["b", "a"]);
    }

    #[test]
    fn test_demographic_scope_filter_precedence() {
        let scope = DemographicScope {
            level: None,
            campaign_id: Some("c1".to_string()),
            adset_id: Some("s1".to_string()),
        };
        let filter = scope.filter().unwrap();
        assert_eq!(filter.field, "adset.id");
        assert_eq!(scope.level(), Level::AdSet);

        let campaign_only = DemographicScope {
            campaign_id: Some("c1".to_string()),
            ..DemographicScope::default()
        };
        assert_eq!(campaign_only.filter().unwrap().field, "campaign.id");
        assert_eq!(campaign_only.level(), Level::Campaign);

        assert!(DemographicScope::default().filter().is_none());
    }

    #[test]
    fn test_entity_reports_sort_by_derived_metrics() {
        let mut engaged = row("1", 100);
        engaged.inline_post_engagement = 50;
        let mut quiet = row("2", 1000);
        quiet.inline_post_engagement = 10;

        let mut reports = vec![
            EntityReport::new(quiet, DEFAULT_LEAD_VALUE, CURRENCY_SYMBOL),
            EntityReport::new(engaged, DEFAULT_LEAD_VALUE, CURRENCY_SYMBOL),
        ];

        sort_rows(
            &mut reports,
            &SortSpec::new("engagement_rate", SortDirection::Desc),
        );
        assert_eq!(reports[0].row.campaign_id.as_deref(), Some("1"));

        sort_rows(&mut reports, &SortSpec::default());
        assert_eq!(reports[0].row.campaign_id.as_deref(), Some("2"));

        // No conversions: cost per conversion has no sort key
        assert!(reports[0].sort_value("cost_per_conversion").is_none());
    }

    #[test]
    fn test_rate_columns_sort_by_displayed_values() {
        // Platform omitted frequency and reported a stale ctr
        let mut wide = row("1", 1000);
        wide.reach = 1000;
        wide.clicks = 10;
        wide.ctr = 9.0;
        let mut narrow = row("2", 1000);
        narrow.reach = 250;
        narrow.clicks = 50;
        narrow.ctr = 1.0;

        let mut reports = vec![
            EntityReport::new(wide, DEFAULT_LEAD_VALUE, CURRENCY_SYMBOL),
            EntityReport::new(narrow, DEFAULT_LEAD_VALUE, CURRENCY_SYMBOL),
        ];

        sort_rows(&mut reports, &SortSpec::new("frequency", SortDirection::Desc));
        assert_eq!(reports[0].row.campaign_id.as_deref(), Some("2"));
        assert_eq!(reports[0].metrics.frequency, 4.0);

        sort_rows(&mut reports, &SortSpec::new("ctr", SortDirection::Desc));
        assert_eq!(reports[0].row.campaign_id.as_deref(), Some("2"));
        assert_eq!(reports[0].display.ctr, format_percentage(reports[0].metrics.ctr));
    }

    #[test]
    fn test_entity_report_serializes_flat_row() {
        let mut source = row("9", 12345);
        source.spend = 30.0;
        source.clicks = 3;
        source.objective = Some("OUTCOME_LEADS".to_string());
        source.actions = Some(vec![crate::model::ActionValue {
            action_type: "lead".to_string(),
            value: 2.0,
        }]);
        let report = EntityReport::new(source, DEFAULT_LEAD_VALUE, "$");
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["campaign_id"], "9");
        assert_eq!(value["status"], "UNKNOWN");
        assert_eq!(value["metrics"]["cost_per_conversion"], 15.0);
        assert!(value.get("creative").is_none());

        let display = &value["display"];
        assert_eq!(display["impressions"], "12,345");
        assert_eq!(display["spend"], "$30.00");
        assert_eq!(display["cost_per_conversion"], "$15.00");
        assert_eq!(display["roas"], "3.33x");
        assert_eq!(display["video_completion_rate"], "N/A");
        assert_eq!(display["objective"], "Outcome Leads");
        assert_eq!(display["quality_ranking"], "Unknown");

        let empty = EntityReport::new(row("10", 0), DEFAULT_LEAD_VALUE, "$");
        assert_eq!(empty.display.cost_per_conversion, "N/A");
        assert_eq!(empty.display.ctr, "0.00%");
    }
}
