use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorPayload, HarvestError};

// --- Request options ---

/// Listing sort order on the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    #[default]
    Hot,
    New,
    Top,
}

impl Sort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sort::Hot => "hot",
            Sort::New => "new",
            Sort::Top => "top",
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(Sort::Hot),
            "new" => Ok(Sort::New),
            "top" => Ok(Sort::Top),
            other => Err(format!("unknown sort '{other}' (expected hot, new or top)")),
        }
    }
}

/// Time window applied to `top` listings (ignored upstream for the others).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Hour,
    Day,
    #[default]
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hour" => Ok(TimeWindow::Hour),
            "day" => Ok(TimeWindow::Day),
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            "year" => Ok(TimeWindow::Year),
            "all" => Ok(TimeWindow::All),
            other => Err(format!("unknown time window '{other}'")),
        }
    }
}

/// Caller-supplied knobs for one harvest. `limit: None` means the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestOptions {
    pub sort: Sort,
    pub time_window: TimeWindow,
    pub limit: Option<usize>,
    pub force_refresh: bool,
    pub include_profiles: bool,
}

impl HarvestOptions {
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = window;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn force_refresh(mut self, yes: bool) -> Self {
        self.force_refresh = yes;
        self
    }

    pub fn include_profiles(mut self, yes: bool) -> Self {
        self.include_profiles = yes;
        self
    }
}

// --- Records ---

/// One author signal produced by a strategy. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub identity: String,
    pub source_link: String,
    pub score: i64,
    pub resource: String,
    pub created_at: Option<DateTime<Utc>>,
    pub title: String,
}

impl RawRecord {
    /// Key used to count unique records across strategies.
    pub fn dedup_key(&self) -> (String, String) {
        (self.identity.to_lowercase(), self.source_link.clone())
    }
}

/// An identity recognised in unstructured text (search snippets, page markup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCreator {
    pub username: String,
    pub source_link: String,
    pub score: i64,
    pub resource: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub title: String,
}

impl From<ExtractedCreator> for RawRecord {
    fn from(c: ExtractedCreator) -> Self {
        RawRecord {
            identity: c.username,
            source_link: c.source_link,
            score: c.score,
            resource: c.resource,
            created_at: c.timestamp,
            title: c.title,
        }
    }
}

/// Public profile facts for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorProfile {
    pub username: String,
    pub link_karma: i64,
    pub comment_karma: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub icon_url: Option<String>,
    pub verified: bool,
}

/// One entry of the bounded, deduplicated, ranked output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCreator {
    /// First-seen casing of the identity.
    pub username: String,
    pub total_score: i64,
    pub post_count: usize,
    pub resource: String,
    pub top_post_title: String,
    pub top_post_link: String,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<CreatorProfile>,
}

// --- Strategy chain reporting ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    AuthenticatedListing,
    UnauthenticatedRawEndpoint,
    SearchEngineDiscovery,
    TextExtractionFallback,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::AuthenticatedListing => "authenticated_listing",
            StrategyKind::UnauthenticatedRawEndpoint => "unauthenticated_raw_endpoint",
            StrategyKind::SearchEngineDiscovery => "search_engine_discovery",
            StrategyKind::TextExtractionFallback => "text_extraction_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum StrategyOutcome {
    Ok,
    Empty,
    Failed(String),
    TimedOut,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub name: String,
    pub kind: StrategyKind,
    /// Records this strategy contributed that were not already accumulated.
    pub yielded: usize,
    pub outcome: StrategyOutcome,
}

/// Strategy chain state machine: `Idle → Running(i) → Sufficient | Exhausted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    #[default]
    Idle,
    Running(usize),
    Sufficient,
    Exhausted,
}

impl ChainState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainState::Sufficient | ChainState::Exhausted)
    }
}

// --- Results ---

/// Outcome of one harvest call. Built once, then either served fresh or from cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestResult {
    pub resource: String,
    pub records: Vec<RankedCreator>,
    pub total: usize,
    pub execution_time_ms: u64,
    pub cache_hit: bool,
    pub state: ChainState,
    #[serde(default)]
    pub strategies: Vec<StrategyReport>,
}

/// `{ ok: true, data }` or `{ ok: false, error }`, the shape the routing layer serves.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HarvestResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl From<Result<HarvestResult, HarvestError>> for HarvestResponse {
    fn from(result: Result<HarvestResult, HarvestError>) -> Self {
        match result {
            Ok(data) => HarvestResponse {
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(e) => HarvestResponse {
                ok: false,
                data: None,
                error: Some(e.payload()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_and_window_parse_case_insensitively() {
        assert_eq!("TOP".parse::<Sort>(), Ok(Sort::Top));
        assert_eq!("month".parse::<TimeWindow>(), Ok(TimeWindow::Month));
        assert!("rising".parse::<Sort>().is_err());
    }

    #[test]
    fn extracted_creator_converts_to_raw_record() {
        let raw: RawRecord = ExtractedCreator {
            username: "Alice".into(),
            source_link: "https://example.com/a".into(),
            score: 3,
            resource: "rust".into(),
            timestamp: None,
            title: "t".into(),
        }
        .into();
        assert_eq!(raw.identity, "Alice");
        assert_eq!(raw.dedup_key(), ("alice".to_string(), "https://example.com/a".to_string()));
    }

    #[test]
    fn error_response_shape() {
        let resp: HarvestResponse = Err(HarvestError::Validation("nope".into())).into();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["kind"], "validation");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn strategy_outcome_serializes_with_reason() {
        let json = serde_json::to_value(StrategyOutcome::Failed("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "reason": "boom"}));
    }
}
