// Upstream boundary. Strategies and profile enrichment only see this trait;
// the HTTP implementation rate-limits and authenticates underneath it, and
// tests swap in `testing::MockUpstream`.

use async_trait::async_trait;
use creatorsignal_common::{CreatorProfile, HarvestError, Result};
use reddit_client::{Post, RedditClient};

use crate::fetchers::{SearchHit, SerperFetcher};

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Submissions from a listing URL, with or without the bearer credential.
    async fn listing(&self, url: &str, authenticated: bool) -> Result<Vec<Post>>;

    /// Organic search-engine results.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Raw body of a public page.
    async fn page(&self, url: &str) -> Result<String>;

    /// Per-identity profile.
    async fn profile(&self, username: &str) -> Result<CreatorProfile>;
}

pub struct HttpUpstream {
    reddit: RedditClient,
    search: Option<SerperFetcher>,
}

impl HttpUpstream {
    pub fn new(reddit: RedditClient, search: Option<SerperFetcher>) -> Self {
        Self { reddit, search }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn listing(&self, url: &str, authenticated: bool) -> Result<Vec<Post>> {
        Ok(self.reddit.listing(url, authenticated).await?)
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        match &self.search {
            Some(fetcher) => fetcher.search(query, max_results).await,
            None => Err(HarvestError::Config(
                "search strategy disabled: SERPER_API_KEY is not set".to_string(),
            )),
        }
    }

    async fn page(&self, url: &str) -> Result<String> {
        Ok(self.reddit.public_text(url).await?)
    }

    async fn profile(&self, username: &str) -> Result<CreatorProfile> {
        Ok(self.reddit.user_about(username).await?.into_profile())
    }
}
