//! Breakdown aggregation and derived metrics.
//!
//! Breakdown insights arrive as one row per (entity, dimension value). The
//! functions here collapse those rows into one bucket per dimension value,
//! derive CTR and CPC with zero-guarded division, and compute the
//! dimension-specific extras (weighted average age, gender split, top
//! countries) plus chart-ready series.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::BreakdownRow;

/// Countries kept individually before the rest is folded into [`OTHERS_LABEL`].
pub const TOP_COUNTRY_COUNT: usize = 5;

/// Label of the synthetic bucket that absorbs the long tail of countries.
pub const OTHERS_LABEL: &str = "Others";

/// Label used when a row carries no value for the requested dimension.
pub const MISSING_LABEL: &str = "unknown";

/// Categorical axis used to segment metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breakdown {
    #[default]
    Age,
    Gender,
    Country,
    Region,
    DevicePlatform,
}

impl Breakdown {
    /// The value sent in the `breakdowns` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Breakdown::Age => "age",
            Breakdown::Gender => "gender",
            Breakdown::Country => "country",
            Breakdown::Region => "region",
            Breakdown::DevicePlatform => "device_platform",
        }
    }

    /// Column heading for tables.
    pub fn label(&self) -> &'static str {
        match self {
            Breakdown::Age => "Age Group",
            Breakdown::Gender => "Gender",
            Breakdown::Country => "Country",
            Breakdown::Region => "Region",
            Breakdown::DevicePlatform => "Device",
        }
    }

    fn value_of<'a>(&self, row: &'a BreakdownRow) -> Option<&'a str> {
        match self {
            Breakdown::Age => row.age.as_deref(),
            Breakdown::Gender => row.gender.as_deref(),
            Breakdown::Country => row.country.as_deref(),
            Breakdown::Region => row.region.as_deref(),
            Breakdown::DevicePlatform => row.device_platform.as_deref(),
        }
    }
}

impl FromStr for Breakdown {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "age" => Ok(Breakdown::Age),
            "gender" => Ok(Breakdown::Gender),
            "country" => Ok(Breakdown::Country),
            "region" => Ok(Breakdown::Region),
            "device_platform" | "device" => Ok(Breakdown::DevicePlatform),
            other => Err(format!("unknown breakdown '{}'", other)),
        }
    }
}

impl fmt::Display for Breakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `numerator / denominator`, or 0 when the result would not be finite.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() { value } else { 0.0 }
}

/// All rows sharing one dimension value, summed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBucket {
    pub label: String,
    pub impressions: u64,
    pub reach: u64,
    pub clicks: u64,
    pub spend: f64,
    /// clicks / impressions, as a fraction.
    pub ctr: f64,
    /// spend / clicks.
    pub cpc: f64,
}

impl AggregatedBucket {
    fn from_sums(label: String, sums: Sums) -> Self {
        Self {
            label,
            impressions: sums.impressions,
            reach: sums.reach,
            clicks: sums.clicks,
            spend: sums.spend,
            ctr: safe_ratio(sums.clicks as f64, sums.impressions as f64),
            cpc: safe_ratio(sums.spend, sums.clicks as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Sums {
    impressions: u64,
    reach: u64,
    clicks: u64,
    spend: f64,
}

impl Sums {
    fn add(&mut self, impressions: u64, reach: u64, clicks: u64, spend: f64) {
        self.impressions = self.impressions.saturating_add(impressions);
        self.reach = self.reach.saturating_add(reach);
        self.clicks = self.clicks.saturating_add(clicks);
        self.spend += spend;
    }
}

/// Collapse breakdown rows into one bucket per dimension value.
///
/// Output is ordered by impressions, highest first, with ties broken by
/// label so repeated calls are stable. Empty input yields an empty list.
pub fn aggregate(rows: &[BreakdownRow], breakdown: Breakdown) -> Vec<AggregatedBucket> {
    let mut groups: HashMap<String, Sums> = HashMap::new();

    for row in rows {
        let key = breakdown.value_of(row).unwrap_or(MISSING_LABEL);
        let m = &row.metrics;
        groups
            .entry(key.to_string())
            .or_default()
            .add(m.impressions, m.reach, m.clicks, m.spend);
    }

    let mut buckets: Vec<AggregatedBucket> = groups
        .into_iter()
        .map(|(label, sums)| AggregatedBucket::from_sums(label, sums))
        .collect();

    sort_by_impressions(&mut buckets);
    buckets
}

fn sort_by_impressions(buckets: &mut [AggregatedBucket]) {
    buckets.sort_by(|a, b| {
        b.impressions
            .cmp(&a.impressions)
            .then_with(|| a.label.cmp(&b.label))
    });
}

/// Midpoint estimate for an age bucket label.
pub fn age_midpoint(label: &str) -> Option<f64> {
    match label {
        "13-17" => Some(15.0),
        "18-24" => Some(21.0),
        "25-34" => Some(29.5),
        "35-44" => Some(39.5),
        "45-54" => Some(49.5),
        "55-64" => Some(59.5),
        "65+" => Some(70.0),
        _ => None,
    }
}

/// Impression-weighted average audience age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeMetrics {
    pub average_age: f64,
    pub total_impressions: u64,
    /// Impressions in buckets with no known midpoint; they count as age 0.
    pub unmapped_impressions: u64,
}

/// Weighted average age over age buckets.
///
/// Labels without a midpoint contribute 0 to the weighted sum but still
/// count toward the total. Returns `None` when there are no impressions.
pub fn age_metrics(buckets: &[AggregatedBucket]) -> Option<AgeMetrics> {
    let mut total_impressions = 0u64;
    let mut unmapped_impressions = 0u64;
    let mut weighted_sum = 0.0;

    for bucket in buckets {
        total_impressions = total_impressions.saturating_add(bucket.impressions);
        match age_midpoint(&bucket.label) {
            Some(midpoint) => weighted_sum += midpoint * bucket.impressions as f64,
            None => {
                unmapped_impressions = unmapped_impressions.saturating_add(bucket.impressions);
                if bucket.impressions > 0 {
                    warn!(
                        label = %bucket.label,
                        impressions = bucket.impressions,
                        "Age bucket has no midpoint, counted as zero"
                    );
                }
            }
        }
    }

    if total_impressions == 0 {
        return None;
    }

    Some(AgeMetrics {
        average_age: weighted_sum / total_impressions as f64,
        total_impressions,
        unmapped_impressions,
    })
}

/// Impressions and share of one gender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderShare {
    pub impressions: u64,
    /// Percentage of the combined total, rounded to one decimal.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderDistribution {
    pub male: GenderShare,
    pub female: GenderShare,
    pub unknown: GenderShare,
    pub total_impressions: u64,
}

/// Split gender buckets into male / female / everything else.
pub fn gender_distribution(buckets: &[AggregatedBucket]) -> Option<GenderDistribution> {
    let (mut male, mut female, mut unknown) = (0u64, 0u64, 0u64);

    for bucket in buckets {
        match bucket.label.as_str() {
            "male" => male = male.saturating_add(bucket.impressions),
            "female" => female = female.saturating_add(bucket.impressions),
            _ => unknown = unknown.saturating_add(bucket.impressions),
        }
    }

    let total = male.saturating_add(female).saturating_add(unknown);
    if total == 0 {
        return None;
    }

    let share = |impressions: u64| GenderShare {
        impressions,
        percentage: round1(impressions as f64 / total as f64 * 100.0),
    };

    Some(GenderDistribution {
        male: share(male),
        female: share(female),
        unknown: share(unknown),
        total_impressions: total,
    })
}

/// Keep the `limit` countries with most impressions and fold the rest into
/// a single [`OTHERS_LABEL`] bucket. No "Others" bucket is added when
/// nothing is left over.
pub fn top_countries(buckets: &[AggregatedBucket], limit: usize) -> Vec<AggregatedBucket> {
    let mut sorted = buckets.to_vec();
    sort_by_impressions(&mut sorted);

    if sorted.len() <= limit {
        return sorted;
    }

    let rest = sorted.split_off(limit);
    let mut others = Sums::default();
    for bucket in &rest {
        others.add(bucket.impressions, bucket.reach, bucket.clicks, bucket.spend);
    }
    sorted.push(AggregatedBucket::from_sums(OTHERS_LABEL.to_string(), others));
    sorted
}

/// One named data series of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
}

/// Labels plus one or more aligned data series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

/// Chart data for a breakdown.
///
/// Age charts carry reach and clicks; country charts are capped to the top
/// five plus "Others"; every other dimension charts impressions.
pub fn chart_series(breakdown: Breakdown, buckets: &[AggregatedBucket]) -> ChartSeries {
    let capped;
    let source = if breakdown == Breakdown::Country {
        capped = top_countries(buckets, TOP_COUNTRY_COUNT);
        &capped[..]
    } else {
        buckets
    };

    let labels = source.iter().map(|b| b.label.clone()).collect();
    let series = |label: &str, pick: fn(&AggregatedBucket) -> f64| Dataset {
        label: label.to_string(),
        data: source.iter().map(pick).collect(),
    };

    let datasets = match breakdown {
        Breakdown::Age => vec![
            series("Reach", |b| b.reach as f64),
            series("Clicks", |b| b.clicks as f64),
        ],
        _ => vec![series("Impressions", |b| b.impressions as f64)],
    };

    ChartSeries { labels, datasets }
}

/// Everything a demographic view shows for one breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicReport {
    pub breakdown: Breakdown,
    pub breakdown_label: String,
    pub buckets: Vec<AggregatedBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<AgeMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<GenderDistribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_countries: Option<Vec<AggregatedBucket>>,
    pub chart: ChartSeries,
}

/// Aggregate rows and attach the dimension-specific extras.
///
/// Returns `None` for empty input so callers can show a "no data" state.
pub fn build_report(rows: &[BreakdownRow], breakdown: Breakdown) -> Option<DemographicReport> {
    if rows.is_empty() {
        return None;
    }

    let buckets = aggregate(rows, breakdown);
    let age = (breakdown == Breakdown::Age)
        .then(|| age_metrics(&buckets))
        .flatten();
    let gender = (breakdown == Breakdown::Gender)
        .then(|| gender_distribution(&buckets))
        .flatten();
    let countries =
        (breakdown == Breakdown::Country).then(|| top_countries(&buckets, TOP_COUNTRY_COUNT));
    let chart = chart_series(breakdown, &buckets);

    Some(DemographicReport {
        breakdown,
        breakdown_label: breakdown.label().to_string(),
        buckets,
        age,
        gender,
        top_countries: countries,
        chart,
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
