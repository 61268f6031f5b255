// Retrieval strategies.
//
// Every built-in strategy is one row of `DEFAULT_STRATEGIES`: an endpoint
// template, an auth requirement and an optional pattern set. `TableStrategy`
// interprets a row; the chain only sees the `Strategy` trait.

pub mod markup;

use std::sync::Arc;

use async_trait::async_trait;
use creatorsignal_common::{
    Endpoints, RawRecord, Result, Sort, StrategyKind, TimeWindow,
};
use reddit_client::Post;
use tracing::debug;

use crate::extract::{Extractor, PatternSet, TextDoc};
use crate::upstream::Upstream;

/// What one chain run asks each strategy for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyRequest {
    /// Normalized resource name.
    pub resource: String,
    pub sort: Sort,
    pub time_window: TimeWindow,
    /// Items to request from upstreams that take a count.
    pub fetch_limit: usize,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> StrategyKind;
    async fn fetch(&self, request: &StrategyRequest) -> Result<Vec<RawRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    Required,
    Anonymous,
}

/// One row of the strategy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyDef {
    pub name: &'static str,
    pub kind: StrategyKind,
    /// URL template for listing/page kinds, query template for search.
    pub endpoint: &'static str,
    pub auth: AuthRequirement,
    pub patterns: Option<PatternSet>,
}

pub const DEFAULT_STRATEGIES: &[StrategyDef] = &[
    StrategyDef {
        name: "oauth-listing",
        kind: StrategyKind::AuthenticatedListing,
        endpoint: "{oauth}/r/{resource}/{sort}?t={window}&limit={n}&raw_json=1",
        auth: AuthRequirement::Required,
        patterns: None,
    },
    StrategyDef {
        name: "public-json",
        kind: StrategyKind::UnauthenticatedRawEndpoint,
        endpoint: "{public}/r/{resource}/{sort}.json?t={window}&limit={n}&raw_json=1",
        auth: AuthRequirement::Anonymous,
        patterns: None,
    },
    StrategyDef {
        name: "search-discovery",
        kind: StrategyKind::SearchEngineDiscovery,
        endpoint: "site:reddit.com/r/{resource}",
        auth: AuthRequirement::Anonymous,
        patterns: Some(PatternSet::Discovery),
    },
    StrategyDef {
        name: "markup-fallback",
        kind: StrategyKind::TextExtractionFallback,
        endpoint: "{old}/r/{resource}/{sort}/?t={window}",
        auth: AuthRequirement::Anonymous,
        patterns: Some(PatternSet::Markup),
    },
];

/// Fill `{placeholders}` in a table template.
pub fn expand(template: &str, endpoints: &Endpoints, request: &StrategyRequest) -> String {
    template
        .replace("{oauth}", endpoints.oauth_base.trim_end_matches('/'))
        .replace("{public}", endpoints.public_base.trim_end_matches('/'))
        .replace("{old}", endpoints.old_base.trim_end_matches('/'))
        .replace("{resource}", &request.resource)
        .replace("{sort}", request.sort.as_str())
        .replace("{window}", request.time_window.as_str())
        .replace("{n}", &request.fetch_limit.to_string())
}

pub struct TableStrategy {
    def: StrategyDef,
    upstream: Arc<dyn Upstream>,
    endpoints: Endpoints,
}

impl TableStrategy {
    pub fn new(def: StrategyDef, upstream: Arc<dyn Upstream>, endpoints: Endpoints) -> Self {
        Self {
            def,
            upstream,
            endpoints,
        }
    }

    fn extractor(&self, resource: &str) -> Extractor {
        Extractor::new(resource, self.def.patterns.unwrap_or(PatternSet::Discovery))
    }

    fn records_from_posts(&self, posts: Vec<Post>, resource: &str) -> Vec<RawRecord> {
        let filter = self.extractor(resource);
        posts
            .into_iter()
            .filter_map(|post| {
                let author = post.author.clone()?;
                if !filter.accepts(&author) {
                    return None;
                }
                Some(RawRecord {
                    identity: author,
                    source_link: post.link(&self.endpoints.public_base),
                    score: post.score,
                    resource: resource.to_string(),
                    created_at: post.created_at(),
                    title: post.title.clone().unwrap_or_default(),
                })
            })
            .collect()
    }

    fn records_from_text(&self, docs: &[TextDoc], resource: &str) -> Vec<RawRecord> {
        self.extractor(resource)
            .extract(docs)
            .into_iter()
            .map(RawRecord::from)
            .collect()
    }
}

#[async_trait]
impl Strategy for TableStrategy {
    fn name(&self) -> &str {
        self.def.name
    }

    fn kind(&self) -> StrategyKind {
        self.def.kind
    }

    async fn fetch(&self, request: &StrategyRequest) -> Result<Vec<RawRecord>> {
        let target = expand(self.def.endpoint, &self.endpoints, request);
        debug!(strategy = self.def.name, target = %target, "strategy: fetching");

        match self.def.kind {
            StrategyKind::AuthenticatedListing | StrategyKind::UnauthenticatedRawEndpoint => {
                let authenticated = self.def.auth == AuthRequirement::Required;
                let posts = self.upstream.listing(&target, authenticated).await?;
                Ok(self.records_from_posts(posts, &request.resource))
            }
            StrategyKind::SearchEngineDiscovery => {
                let hits = self
                    .upstream
                    .search(&target, request.fetch_limit.min(100))
                    .await?;
                let docs: Vec<TextDoc> = hits
                    .into_iter()
                    .map(|hit| TextDoc {
                        title: hit.title,
                        snippet: hit.snippet,
                        link: hit.link,
                        score: 1,
                        timestamp: None,
                    })
                    .collect();
                Ok(self.records_from_text(&docs, &request.resource))
            }
            StrategyKind::TextExtractionFallback => {
                let html = self.upstream.page(&target).await?;
                let docs = markup::split_blocks(&html, &self.endpoints.old_base, &target);
                Ok(self.records_from_text(&docs, &request.resource))
            }
        }
    }
}

/// Instantiate the default table against one upstream.
pub fn default_strategies(upstream: Arc<dyn Upstream>, endpoints: &Endpoints) -> Vec<Arc<dyn Strategy>> {
    DEFAULT_STRATEGIES
        .iter()
        .map(|def| {
            Arc::new(TableStrategy::new(*def, upstream.clone(), endpoints.clone())) as Arc<dyn Strategy>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> StrategyRequest {
        StrategyRequest {
            resource: "datascience".into(),
            sort: Sort::Top,
            time_window: TimeWindow::Month,
            fetch_limit: 60,
        }
    }

    #[test]
    fn table_is_in_priority_order() {
        let kinds: Vec<_> = DEFAULT_STRATEGIES.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StrategyKind::AuthenticatedListing,
                StrategyKind::UnauthenticatedRawEndpoint,
                StrategyKind::SearchEngineDiscovery,
                StrategyKind::TextExtractionFallback,
            ]
        );
        assert_eq!(DEFAULT_STRATEGIES[0].auth, AuthRequirement::Required);
        assert!(DEFAULT_STRATEGIES[1..]
            .iter()
            .all(|s| s.auth == AuthRequirement::Anonymous));
    }

    #[test]
    fn expands_listing_templates() {
        let endpoints = Endpoints::default();
        assert_eq!(
            expand(DEFAULT_STRATEGIES[0].endpoint, &endpoints, &request()),
            "https://oauth.reddit.com/r/datascience/top?t=month&limit=60&raw_json=1"
        );
        assert_eq!(
            expand(DEFAULT_STRATEGIES[1].endpoint, &endpoints, &request()),
            "https://www.reddit.com/r/datascience/top.json?t=month&limit=60&raw_json=1"
        );
        assert_eq!(
            expand(DEFAULT_STRATEGIES[2].endpoint, &endpoints, &request()),
            "site:reddit.com/r/datascience"
        );
        assert_eq!(
            expand(DEFAULT_STRATEGIES[3].endpoint, &endpoints, &request()),
            "https://old.reddit.com/r/datascience/top/?t=month"
        );
    }
}
