//! Adpulse - an insights dashboard for ads-platform accounts.
//!
//! # Overview
//!
//! Adpulse connects to an ad account with a user-supplied account id and
//! access token, fetches campaign, ad-set, ad and audience-breakdown
//! insights from the Graph API, and serves them as ready-to-render JSON:
//! derived metrics, aggregated demographic buckets, totals and chart series.
//!
//! Nothing but the credential pair is persisted. Every view re-fetches.
//!
//! # API Endpoints
//!
//! - `POST /credentials` - Probe and save credentials
//! - `GET /campaigns` - Campaign performance
//! - `GET /adsets` - Ad sets of a campaign
//! - `GET /ads` - Ads and creatives of an ad set
//! - `GET /demographics` - Audience breakdown
//! - `GET /health` - Health check
//!
//! # Modules
//!
//! - [`model`]: Platform payload types with lenient numeric parsing
//! - [`daterange`]: Date presets and custom ranges
//! - [`aggregation`]: Breakdown bucketing and dimension-specific extras
//! - [`metrics`]: Entity-level derived metrics and formatting
//! - [`sort`]: Stable column sorting
//! - [`storage`]: SQLite storage layer
//! - [`credentials`]: Credential lifecycle
//! - [`graph`]: Graph API client
//! - [`views`]: View orchestration and request sequencing
//! - [`api`]: HTTP API handlers

pub mod aggregation;
pub mod api;
pub mod credentials;
pub mod daterange;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod sort;
pub mod storage;
pub mod views;
