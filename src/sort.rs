//! Column sorting for rows and buckets.
//!
//! Sort keys are looked up by field name. Values that look numeric are
//! compared as numbers even when they arrived as strings, so `"10"` sorts
//! after `"2"`; everything else compares lexicographically. Sorting is
//! stable, so equal keys keep their relative order across repeated sorts.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregation::AggregatedBucket;
use crate::model::{EntityStatus, Level, MetricRow};

/// Field used when the caller does not pick one.
pub const DEFAULT_SORT_FIELD: &str = "impressions";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Asc),
            "desc" | "descending" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// Which field to sort by, and in which direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: DEFAULT_SORT_FIELD.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Build from optional query parameters, falling back to the defaults.
    pub fn from_params(field: Option<&str>, direction: Option<&str>) -> Self {
        let field = field
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_SORT_FIELD);
        let direction = direction
            .and_then(SortDirection::parse)
            .unwrap_or_default();
        Self::new(field, direction)
    }

    /// Column-header click: the same field flips direction, a new field
    /// starts descending.
    pub fn select(&mut self, field: &str) {
        if self.field == field {
            self.direction = self.direction.toggled();
        } else {
            self.field = field.to_string();
            self.direction = SortDirection::Desc;
        }
    }
}

/// A comparable key.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Number(f64),
    Text(String),
}

impl SortValue {
    /// Numeric-looking text becomes a number.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => SortValue::Number(n),
            _ => SortValue::Text(raw.to_string()),
        }
    }

    fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
            (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
        }
    }
}

impl From<u64> for SortValue {
    fn from(v: u64) -> Self {
        SortValue::Number(v as f64)
    }
}

impl From<f64> for SortValue {
    fn from(v: f64) -> Self {
        SortValue::Number(v)
    }
}

impl From<&str> for SortValue {
    fn from(v: &str) -> Self {
        SortValue::coerce(v)
    }
}

/// Anything that can expose a sort key by field name.
pub trait Sortable {
    fn sort_value(&self, field: &str) -> Option<SortValue>;
}

/// Missing keys order before present ones, so they trail in descending order.
fn compare_keys(a: Option<SortValue>, b: Option<SortValue>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.compare(&b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable in-place sort by `spec`.
pub fn sort_rows<T: Sortable>(rows: &mut [T], spec: &SortSpec) {
    rows.sort_by(|a, b| {
        let ordering = compare_keys(a.sort_value(&spec.field), b.sort_value(&spec.field));
        match spec.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

/// Sorted copy, leaving the input untouched.
pub fn sorted<T: Sortable + Clone>(rows: &[T], spec: &SortSpec) -> Vec<T> {
    let mut copy = rows.to_vec();
    sort_rows(&mut copy, spec);
    copy
}

impl Sortable for Value {
    fn sort_value(&self, field: &str) -> Option<SortValue> {
        match self.get(field)? {
            Value::String(s) => Some(SortValue::coerce(s)),
            Value::Number(n) => n.as_f64().map(SortValue::Number),
            Value::Bool(b) => Some(SortValue::Text(b.to_string())),
            _ => None,
        }
    }
}

impl Sortable for AggregatedBucket {
    fn sort_value(&self, field: &str) -> Option<SortValue> {
        let value = match field {
            "label" => SortValue::Text(self.label.clone()),
            "impressions" => self.impressions.into(),
            "reach" => self.reach.into(),
            "clicks" => self.clicks.into(),
            "spend" => self.spend.into(),
            "ctr" => self.ctr.into(),
            "cpc" => self.cpc.into(),
            _ => return None,
        };
        Some(value)
    }
}

impl Sortable for MetricRow {
    fn sort_value(&self, field: &str) -> Option<SortValue> {
        let value = match field {
            "name" => SortValue::Text(
                self.entity_name(Level::Ad)
                    .or(self.entity_name(Level::AdSet))
                    .or(self.entity_name(Level::Campaign))?
                    .to_string(),
            ),
            "campaign_name" => SortValue::Text(self.campaign_name.clone()?),
            "adset_name" => SortValue::Text(self.adset_name.clone()?),
            "ad_name" => SortValue::Text(self.ad_name.clone()?),
            "campaign_id" => self.campaign_id.as_deref()?.into(),
            "adset_id" => self.adset_id.as_deref()?.into(),
            "ad_id" => self.ad_id.as_deref()?.into(),
            "status" => SortValue::Text(
                match self.status {
                    EntityStatus::Active => "ACTIVE",
                    EntityStatus::Paused => "PAUSED",
                    EntityStatus::Unknown => "UNKNOWN",
                }
                .to_string(),
            ),
            "impressions" => self.impressions.into(),
            "reach" => self.reach.into(),
            "clicks" => self.clicks.into(),
            "unique_clicks" => self.unique_clicks.into(),
            "inline_link_clicks" => self.inline_link_clicks.into(),
            "inline_post_engagement" => self.inline_post_engagement.into(),
            "spend" => self.spend.into(),
            "ctr" => self.ctr.into(),
            "cpc" => self.cpc.into(),
            "cpm" => self.cpm.into(),
            "frequency" => self.frequency.into(),
            _ => return None,
        };
        Some(value)
    }
}
