//! Entity-level derived metrics.
//!
//! These apply to a single campaign, ad set or ad row rather than to an
//! aggregated bucket. Note the two different zero policies: ratios such as
//! CTR or conversion rate collapse to 0, while cost per conversion is
//! explicitly "not available" when there were no conversions.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::aggregation::safe_ratio;
use crate::model::{MetricRow, Ranking, action_value, first_value};

/// Assumed revenue per lead when no purchase value is reported.
pub const DEFAULT_LEAD_VALUE: f64 = 50.0;

/// Currency symbol used by the display helpers.
pub const CURRENCY_SYMBOL: &str = "₹";

const LEAD_ACTION: &str = "lead";
const PURCHASE_ACTION: &str = "purchase";
const VIDEO_VIEW_ACTION: &str = "video_view";

/// Click-through rate as a fraction.
pub fn ctr(row: &MetricRow) -> f64 {
    safe_ratio(row.clicks as f64, row.impressions as f64)
}

pub fn cpc(row: &MetricRow) -> f64 {
    safe_ratio(row.spend, row.clicks as f64)
}

/// Cost per thousand impressions.
pub fn cpm(row: &MetricRow) -> f64 {
    safe_ratio(row.spend * 1000.0, row.impressions as f64)
}

/// Average exposures per person; the platform value when present.
pub fn frequency(row: &MetricRow) -> f64 {
    if row.frequency > 0.0 {
        row.frequency
    } else {
        safe_ratio(row.impressions as f64, row.reach as f64)
    }
}

/// Post engagements per impression, as a fraction.
pub fn engagement_rate(row: &MetricRow) -> f64 {
    safe_ratio(row.inline_post_engagement as f64, row.impressions as f64)
}

/// Whether an action type counts as a conversion.
pub fn is_conversion_action(action_type: &str) -> bool {
    action_type.starts_with("offsite_conversion")
        || action_type == "onsite_conversion.purchase"
        || action_type == LEAD_ACTION
        || action_type == PURCHASE_ACTION
}

/// Sum of all conversion-class action values.
pub fn conversion_count(row: &MetricRow) -> f64 {
    row.actions()
        .unwrap_or_default()
        .iter()
        .filter(|a| is_conversion_action(&a.action_type))
        .map(|a| a.value)
        .sum()
}

/// Conversions per click, as a fraction.
pub fn conversion_rate(row: &MetricRow) -> f64 {
    safe_ratio(conversion_count(row), row.clicks as f64)
}

/// Cost per conversion, which has no meaningful value without conversions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostPerConversion {
    NotAvailable,
    Amount(f64),
}

impl CostPerConversion {
    pub fn amount(&self) -> Option<f64> {
        match self {
            CostPerConversion::NotAvailable => None,
            CostPerConversion::Amount(v) => Some(*v),
        }
    }
}

impl fmt::Display for CostPerConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostPerConversion::NotAvailable => f.write_str("N/A"),
            CostPerConversion::Amount(v) => f.write_str(&format_currency(*v)),
        }
    }
}

impl Serialize for CostPerConversion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CostPerConversion::NotAvailable => serializer.serialize_str("N/A"),
            CostPerConversion::Amount(v) => serializer.serialize_f64(*v),
        }
    }
}

pub fn cost_per_conversion(row: &MetricRow) -> CostPerConversion {
    let conversions = conversion_count(row);
    if conversions <= 0.0 {
        return CostPerConversion::NotAvailable;
    }
    let cost = row.spend / conversions;
    if cost.is_finite() {
        CostPerConversion::Amount(cost)
    } else {
        CostPerConversion::NotAvailable
    }
}

/// Spend per lead; 0 when there are no leads.
pub fn cost_per_lead(row: &MetricRow) -> f64 {
    safe_ratio(row.spend, action_value(row.actions(), LEAD_ACTION))
}

/// Return on ad spend.
///
/// Tiers, first match wins: the platform's website purchase ROAS, the
/// platform's purchase ROAS, reported purchase value over spend, and finally
/// leads times `lead_value` over spend. Zero spend without a platform figure
/// yields 0.
pub fn roas(row: &MetricRow, lead_value: f64) -> f64 {
    if let Some(official) = first_value(row.website_purchase_roas.as_deref())
        .or_else(|| first_value(row.purchase_roas.as_deref()))
    {
        return official;
    }

    if row.spend <= 0.0 {
        return 0.0;
    }

    let purchase_value = action_value(row.action_values.as_deref(), PURCHASE_ACTION);
    let revenue = if purchase_value > 0.0 {
        purchase_value
    } else {
        action_value(row.actions(), LEAD_ACTION) * lead_value
    };

    safe_ratio(revenue, row.spend)
}

/// Heuristic 1-10 quality estimate from CTR (in percent) and frequency.
pub fn quality_score(row: &MetricRow) -> f64 {
    let freq = if row.frequency > 0.0 { row.frequency } else { 1.0 };
    let estimate = ctr(row) * 100.0 * (1.0 / freq);
    let rounded = (estimate * 10.0).round() / 10.0;
    rounded.clamp(1.0, 10.0)
}

/// Completed views over started views, `None` without completion data.
pub fn video_completion_rate(row: &MetricRow) -> Option<f64> {
    let completions = row.video_p100_watched_actions.as_deref()?;
    let completed = action_value(Some(completions), VIDEO_VIEW_ACTION);
    let started = match action_value(row.video_play_actions.as_deref(), VIDEO_VIEW_ACTION) {
        v if v > 0.0 => v,
        _ => 1.0,
    };
    Some(safe_ratio(completed, started))
}

/// Derived figures shown next to every entity row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityMetrics {
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub frequency: f64,
    pub engagement_rate: f64,
    pub conversions: f64,
    pub conversion_rate: f64,
    pub cost_per_conversion: CostPerConversion,
    pub cost_per_lead: f64,
    pub roas: f64,
    pub quality_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_completion_rate: Option<f64>,
}

impl EntityMetrics {
    pub fn compute(row: &MetricRow, lead_value: f64) -> Self {
        Self {
            ctr: ctr(row),
            cpc: cpc(row),
            cpm: cpm(row),
            frequency: frequency(row),
            engagement_rate: engagement_rate(row),
            conversions: conversion_count(row),
            conversion_rate: conversion_rate(row),
            cost_per_conversion: cost_per_conversion(row),
            cost_per_lead: cost_per_lead(row),
            roas: roas(row, lead_value),
            quality_score: quality_score(row),
            video_completion_rate: video_completion_rate(row),
        }
    }
}

/// Summary cards across a set of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub impressions: u64,
    pub reach: u64,
    pub clicks: u64,
    pub spend: f64,
    /// impressions / reach, with reach floored at 1.
    pub frequency: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
}

impl Totals {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a MetricRow>) -> Self {
        let mut totals = Totals::default();
        for row in rows {
            totals.impressions = totals.impressions.saturating_add(row.impressions);
            totals.reach = totals.reach.saturating_add(row.reach);
            totals.clicks = totals.clicks.saturating_add(row.clicks);
            totals.spend += row.spend;
        }

        let impressions = totals.impressions as f64;
        totals.frequency = impressions / totals.reach.max(1) as f64;
        totals.ctr = safe_ratio(totals.clicks as f64, impressions);
        totals.cpc = safe_ratio(totals.spend, totals.clicks as f64);
        totals.cpm = safe_ratio(totals.spend * 1000.0, impressions);
        totals
    }
}

/// Integer part grouped in thousands, e.g. `1,234,567`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let rounded = value.round();
    let digits = (rounded.abs() as u64).to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}

pub fn format_currency(amount: f64) -> String {
    format_amount(CURRENCY_SYMBOL, amount)
}

/// Two-decimal amount behind an arbitrary currency symbol.
pub fn format_amount(symbol: &str, amount: f64) -> String {
    let amount = if amount.is_finite() { amount } else { 0.0 };
    format!("{}{:.2}", symbol, amount)
}

/// A fraction rendered as a percentage with two decimals.
pub fn format_percentage(fraction: f64) -> String {
    let fraction = if fraction.is_finite() { fraction } else { 0.0 };
    format!("{:.2}%", fraction * 100.0)
}

/// `OUTCOME_LEADS` -> `Outcome Leads`.
pub fn format_objective(objective: Option<&str>) -> String {
    let Some(objective) = objective.filter(|o| !o.is_empty()) else {
        return "Unknown".to_string();
    };

    objective
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_ranking(ranking: Option<Ranking>) -> &'static str {
    ranking.map(|r| r.label()).unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionValue;

    fn action(action_type: &str, value: f64) -> ActionValue {
        ActionValue {
            action_type: action_type.to_string(),
            value,
        }
    }

    fn row(impressions: u64, clicks: u64, spend: f64) -> MetricRow {
        MetricRow {
            impressions,
            reach: impressions,
            clicks,
            spend,
            ..MetricRow::default()
        }
    }

    #[test]
    fn test_engagement_rate() {
        let mut r = row(1000, 10, 5.0);
        r.inline_post_engagement = 25;

        assert_eq!(engagement_rate(&r), 0.025);
        assert_eq!(format_percentage(engagement_rate(&r)), "2.50%");
        assert_eq!(engagement_rate(&row(0, 0, 0.0)), 0.0);
    }

    #[test]
    fn test_conversions_sum_all_conversion_classes() {
        let mut r = row(1000, 50, 100.0);
        r.actions = Some(vec![
            action("link_click", 40.0),
            action("offsite_conversion.fb_pixel_lead", 2.0),
            action("lead", 3.0),
            action("purchase", 5.0),
        ]);

        assert_eq!(conversion_count(&r), 10.0);
        assert_eq!(conversion_rate(&r), 0.2);
        assert_eq!(cost_per_conversion(&r), CostPerConversion::Amount(10.0));
        assert_eq!(cost_per_conversion(&r).to_string(), "₹10.00");
    }

    #[test]
    fn test_conversion_rate_without_clicks() {
        let mut r = row(1000, 0, 10.0);
        r.actions = Some(vec![action("lead", 3.0)]);

        assert_eq!(conversion_rate(&r), 0.0);
    }

    #[test]
    fn test_cost_per_conversion_not_available() {
        let r = row(1000, 10, 50.0);
        let cost = cost_per_conversion(&r);

        assert_eq!(cost, CostPerConversion::NotAvailable);
        assert_eq!(cost.to_string(), "N/A");
        assert_eq!(cost.amount(), None);
        assert_eq!(serde_json::to_value(cost).unwrap(), serde_json::json!("N/A"));
    }

    #[test]
    fn test_roas_prefers_platform_figure() {
        let mut r = row(1000, 10, 100.0);
        r.website_purchase_roas = Some(vec![action("omni_purchase", 3.5)]);
        r.purchase_roas = Some(vec![action("omni_purchase", 9.0)]);
        r.action_values = Some(vec![action("purchase", 1000.0)]);

        assert_eq!(roas(&r, DEFAULT_LEAD_VALUE), 3.5);

        r.website_purchase_roas = None;
        assert_eq!(roas(&r, DEFAULT_LEAD_VALUE), 9.0);
    }

    #[test]
    fn test_roas_falls_back_to_purchase_value_then_leads() {
        let mut r = row(1000, 10, 100.0);
        r.action_values = Some(vec![action("purchase", 250.0)]);
        r.actions = Some(vec![action("lead", 4.0)]);
        assert_eq!(roas(&r, DEFAULT_LEAD_VALUE), 2.5);

        r.action_values = None;
        assert_eq!(roas(&r, DEFAULT_LEAD_VALUE), 2.0);

        r.spend = 0.0;
        assert_eq!(roas(&r, DEFAULT_LEAD_VALUE), 0.0);
    }

    #[test]
    fn test_quality_score_is_bounded() {
        // 2% CTR at frequency 1 -> 2.0
        let mut r = row(1000, 20, 10.0);
        r.frequency = 1.0;
        assert_eq!(quality_score(&r), 2.0);

        // 50% CTR -> capped at 10
        assert_eq!(quality_score(&row(100, 50, 1.0)), 10.0);

        // no clicks -> floored at 1
        assert_eq!(quality_score(&row(100, 0, 1.0)), 1.0);

        // frequency dampens the estimate
        r.frequency = 2.0;
        assert_eq!(quality_score(&r), 1.0);
    }

    #[test]
    fn test_video_completion_rate() {
        let mut r = row(1000, 10, 10.0);
        assert_eq!(video_completion_rate(&r), None);

        r.video_p100_watched_actions = Some(vec![action("video_view", 25.0)]);
        r.video_play_actions = Some(vec![action("video_view", 100.0)]);
        assert_eq!(video_completion_rate(&r), Some(0.25));

        r.video_play_actions = None;
        assert_eq!(video_completion_rate(&r), Some(25.0));
    }

    #[test]
    fn test_cost_per_lead() {
        let mut r = row(1000, 10, 30.0);
        assert_eq!(cost_per_lead(&r), 0.0);

        r.actions = Some(vec![action("lead", 3.0)]);
        assert_eq!(cost_per_lead(&r), 10.0);
    }

    #[test]
    fn test_entity_metrics_never_infinite() {
        let r = row(0, 0, 25.0);
        let m = EntityMetrics::compute(&r, DEFAULT_LEAD_VALUE);

        for v in [m.ctr, m.cpc, m.cpm, m.frequency, m.conversion_rate, m.roas] {
            assert!(v.is_finite());
        }
        assert_eq!(m.cost_per_conversion, CostPerConversion::NotAvailable);
    }

    #[test]
    fn test_totals() {
        let rows = vec![row(1000, 10, 5.0), row(3000, 30, 15.0)];
        let totals = Totals::from_rows(&rows);

        assert_eq!(totals.impressions, 4000);
        assert_eq!(totals.clicks, 40);
        assert_eq!(totals.spend, 20.0);
        assert_eq!(totals.frequency, 1.0);
        assert_eq!(totals.ctr, 0.01);
        assert_eq!(totals.cpc, 0.5);
        assert_eq!(totals.cpm, 5.0);

        let empty = Totals::from_rows(&[]);
        assert_eq!(empty.frequency, 0.0);
        assert_eq!(empty.cpc, 0.0);
    }

    #[test]
    fn test_totals_saturate_on_huge_counters() {
        let rows = vec![row(u64::MAX, u64::MAX, 1.0), row(u64::MAX, 5, 1.0)];
        let totals = Totals::from_rows(&rows);

        assert_eq!(totals.impressions, u64::MAX);
        assert_eq!(totals.reach, u64::MAX);
        assert_eq!(totals.clicks, u64::MAX);
        assert_eq!(totals.spend, 2.0);
        assert!(totals.frequency.is_finite());
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_number(1234567.0), "1,234,567");
        assert_eq!(format_number(999.0), "999");
        assert_eq!(format_number(f64::NAN), "0");
        assert_eq!(format_currency(12.5), "₹12.50");
        assert_eq!(format_currency(f64::INFINITY), "₹0.00");
        assert_eq!(format_objective(Some("OUTCOME_LEADS")), "Outcome Leads");
        assert_eq!(format_objective(None), "Unknown");
        assert_eq!(format_ranking(Some(Ranking::Top)), "Top Ranking");
        assert_eq!(format_ranking(None), "Unknown");
    }
}
