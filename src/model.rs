//! Data models for Adpulse.
//!
//! The ads platform reports almost every counter as a decimal string
//! (`"impressions": "1234"`, `"spend": "12.50"`), omits fields that have no
//! data, and nests action counts in `{action_type, value}` lists. The types in
//! this module absorb that: numeric fields go through [`numeric`] and default
//! to zero, nested lists are `Option<Vec<_>>` with shared extraction helpers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lenient numeric parsing for platform payloads.
///
/// Absent, null, empty, non-numeric and non-finite values all become zero.
pub mod numeric {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Parse a decimal string, falling back to `0.0`.
    pub fn parse_amount(raw: &str) -> f64 {
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    /// Parse a counter, truncating any fractional part and clamping negatives to zero.
    pub fn parse_count(raw: &str) -> u64 {
        to_count(parse_amount(raw))
    }

    fn to_count(value: f64) -> u64 {
        if value > 0.0 { value.trunc() as u64 } else { 0 }
    }

    fn value_to_amount(value: Option<Value>) -> f64 {
        match value {
            Some(Value::String(s)) => parse_amount(&s),
            Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value_to_amount(value))
    }

    pub fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(to_count(value_to_amount(value)))
    }
}

/// Reporting level of an insights query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Campaign,
    #[serde(rename = "adset")]
    AdSet,
    Ad,
}

impl Level {
    /// The value the platform expects in the `level` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Campaign => "campaign",
            Level::AdSet => "adset",
            Level::Ad => "ad",
        }
    }
}

/// Delivery status of a campaign, ad set or ad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Active,
    Paused,
    /// Anything else the platform reports, or a status lookup that failed.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Quality, engagement and conversion rankings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ranking {
    BelowAverage,
    Average,
    AboveAverage,
    Top,
    #[serde(other)]
    Unknown,
}

impl Ranking {
    pub fn label(&self) -> &'static str {
        match self {
            Ranking::BelowAverage => "Below Average",
            Ranking::Average => "Average",
            Ranking::AboveAverage => "Above Average",
            Ranking::Top => "Top Ranking",
            Ranking::Unknown => "Unknown",
        }
    }
}

/// One entry of an `actions`-style list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionValue {
    #[serde(default)]
    pub action_type: String,

    #[serde(default, deserialize_with = "numeric::amount")]
    pub value: f64,
}

/// Value of the first entry matching `action_type`, or 0.
pub fn action_value(actions: Option<&[ActionValue]>, action_type: &str) -> f64 {
    actions
        .and_then(|list| list.iter().find(|a| a.action_type == action_type))
        .map(|a| a.value)
        .unwrap_or(0.0)
}

/// Value of the first entry regardless of type, if the list has one.
pub fn first_value(actions: Option<&[ActionValue]>) -> Option<f64> {
    actions.and_then(|list| list.first()).map(|a| a.value)
}

/// Summarized audience targeting of a campaign's first ad set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetingSummary {
    pub age: String,
    pub gender: String,
}

/// Raw targeting spec as returned on ad sets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Targeting {
    #[serde(default)]
    pub age_min: Option<u32>,

    #[serde(default)]
    pub age_max: Option<u32>,

    /// 1 = men, 2 = women.
    #[serde(default)]
    pub genders: Option<Vec<u8>>,
}

impl Targeting {
    pub fn summary(&self) -> TargetingSummary {
        let age = match (self.age_min, self.age_max) {
            (Some(min), Some(max)) => format!("{}-{}", min, max),
            _ => "All Ages".to_string(),
        };

        let gender = match self.genders.as_deref() {
            Some(g) if g.contains(&1) && !g.contains(&2) => "Men",
            Some(g) if g.contains(&2) && !g.contains(&1) => "Women",
            _ => "All Genders",
        };

        TargetingSummary {
            age,
            gender: gender.to_string(),
        }
    }
}

/// A flat performance record for one campaign, ad set or ad.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,

    /// Joined from the entity metadata endpoints; never part of insights.
    #[serde(default)]
    pub status: EntityStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting: Option<TargetingSummary>,

    #[serde(default, deserialize_with = "numeric::count")]
    pub impressions: u64,
    #[serde(default, deserialize_with = "numeric::count")]
    pub reach: u64,
    #[serde(default, deserialize_with = "numeric::count")]
    pub clicks: u64,
    #[serde(default, deserialize_with = "numeric::count")]
    pub unique_clicks: u64,
    #[serde(default, deserialize_with = "numeric::count")]
    pub inline_link_clicks: u64,
    #[serde(default, deserialize_with = "numeric::count")]
    pub inline_post_engagement: u64,
    #[serde(default, deserialize_with = "numeric::amount")]
    pub spend: f64,

    /// Platform-computed CTR, in percent.
    #[serde(default, deserialize_with = "numeric::amount")]
    pub ctr: f64,
    #[serde(default, deserialize_with = "numeric::amount")]
    pub cpc: f64,
    #[serde(default, deserialize_with = "numeric::amount")]
    pub cpm: f64,
    #[serde(default, deserialize_with = "numeric::amount")]
    pub frequency: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ActionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_values: Option<Vec<ActionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_clicks: Option<Vec<ActionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_play_actions: Option<Vec<ActionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_p25_watched_actions: Option<Vec<ActionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_p50_watched_actions: Option<Vec<ActionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_p75_watched_actions: Option<Vec<ActionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_p100_watched_actions: Option<Vec<ActionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_purchase_roas: Option<Vec<ActionValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_roas: Option<Vec<ActionValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_ranking: Option<Ranking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_rate_ranking: Option<Ranking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_rate_ranking: Option<Ranking>,
}

impl MetricRow {
    /// Identifier of the entity this row describes at `level`.
    pub fn entity_id(&self, level: Level) -> Option<&str> {
        match level {
            Level::Campaign => self.campaign_id.as_deref(),
            Level::AdSet => self.adset_id.as_deref(),
            Level::Ad => self.ad_id.as_deref(),
        }
    }

    /// Display name of the entity this row describes at `level`.
    pub fn entity_name(&self, level: Level) -> Option<&str> {
        match level {
            Level::Campaign => self.campaign_name.as_deref(),
            Level::AdSet => self.adset_name.as_deref(),
            Level::Ad => self.ad_name.as_deref(),
        }
    }

    pub fn actions(&self) -> Option<&[ActionValue]> {
        self.actions.as_deref()
    }
}

/// A [`MetricRow`] tagged with one categorical breakdown value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BreakdownRow {
    #[serde(flatten)]
    pub metrics: MetricRow,

    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub device_platform: Option<String>,
}

/// The account id / access token pair every request is made with.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub account_id: String,
    pub access_token: String,
}

impl Credentials {
    pub fn new(account_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into().trim().to_string(),
            access_token: access_token.into().trim().to_string(),
        }
    }

    /// Graph node of the ad account (`act_<id>`), without doubling the prefix.
    pub fn account_node(&self) -> String {
        if self.account_id.starts_with("act_") {
            self.account_id.clone()
        } else {
            format!("act_{}", self.account_id)
        }
    }

    pub fn is_blank(&self) -> bool {
        self.account_id.is_empty() || self.access_token.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Business that owns an ad account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Ad account metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub timezone_name: Option<String>,

    /// Lifetime spend in minor currency units.
    #[serde(default, deserialize_with = "numeric::amount")]
    pub amount_spent: f64,

    #[serde(default)]
    pub business: Option<BusinessRef>,
    #[serde(default)]
    pub account_status: Option<i64>,
}

impl AccountInfo {
    pub fn status_label(&self) -> &'static str {
        match self.account_status {
            Some(1) => "Active",
            Some(2) => "Disabled",
            Some(3) => "Unsettled",
            Some(7) => "Pending Review",
            Some(9) => "In Grace Period",
            _ => "Unknown",
        }
    }

    /// Lifetime spend in major units, `None` when nothing was reported.
    pub fn amount_spent_major(&self) -> Option<f64> {
        (self.amount_spent > 0.0).then(|| self.amount_spent / 100.0)
    }
}

/// Id, name and status of a campaign, ad set or ad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: EntityStatus,
}

/// Creative metadata attached to an ad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// An ad together with its creative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub creative: Option<CreativeSummary>,
}

/// Targeting entry from the account's ad-set listing.
#[derive(Debug, Clone, Deserialize)]
pub struct AdSetTargeting {
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub targeting: Option<Targeting>,
}
