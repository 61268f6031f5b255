// Test mocks for the harvester.
//
// MockUpstream implements `Upstream` with per-resource fixtures for each
// upstream kind. Listings, searches and pages are keyed by the resource name
// found after `/r/` in the URL or query; profiles are keyed by username.
// Anything unregistered fails with a 404-style ExternalService error, so an
// unscripted strategy behaves like a dead endpoint.
//
// Plus helpers for constructing posts, search hits and profiles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use creatorsignal_common::{CreatorProfile, HarvestError, Result};
use reddit_client::Post;

use crate::fetchers::SearchHit;
use crate::upstream::Upstream;

// ---------------------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------------------

/// A listing submission by `author`.
pub fn post(author: &str, title: &str, score: i64) -> Post {
    let id = format!("{:x}", title.len() as i64 * 31 + score);
    Post {
        id: Some(id.clone()),
        author: Some(author.to_string()),
        title: Some(title.to_string()),
        permalink: Some(format!("/r/test/comments/{id}/{}/", slug(title))),
        url: None,
        subreddit: Some("test".to_string()),
        score,
        num_comments: 0,
        created_utc: Some(1_700_000_000.0 + score as f64),
        stickied: false,
    }
}

/// An organic search result.
pub fn hit(title: &str, snippet: &str, link: &str) -> SearchHit {
    SearchHit {
        link: link.to_string(),
        title: title.to_string(),
        snippet: snippet.to_string(),
    }
}

pub fn profile(username: &str) -> CreatorProfile {
    CreatorProfile {
        username: username.to_string(),
        link_karma: 1200,
        comment_karma: 3400,
        created_at: DateTime::<Utc>::from_timestamp(1_500_000_000, 0),
        icon_url: None,
        verified: true,
    }
}

fn slug(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// The resource segment of a listing URL or search query, lowercased.
fn resource_of(target: &str) -> Option<String> {
    let start = target.find("/r/")? + 3;
    let rest = &target[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    Some(rest[..end].to_lowercase())
}

// ---------------------------------------------------------------------------
// MockUpstream
// ---------------------------------------------------------------------------

enum Scripted<T> {
    Respond(T),
    Fail(HarvestError),
}

impl<T: Clone> Scripted<T> {
    fn play(&self) -> Result<T> {
        match self {
            Scripted::Respond(value) => Ok(value.clone()),
            Scripted::Fail(e) => Err(e.clone()),
        }
    }
}

/// Builder pattern: `.on_authenticated_listing()`, `.on_public_listing()`,
/// `.on_search()`, `.on_page()`, `.on_profile()`, and `failing_*` variants.
#[derive(Default)]
pub struct MockUpstream {
    authenticated: HashMap<String, Scripted<Vec<Post>>>,
    public: HashMap<String, Scripted<Vec<Post>>>,
    searches: HashMap<String, Scripted<Vec<SearchHit>>>,
    pages: HashMap<String, Scripted<String>>,
    profiles: HashMap<String, Scripted<CreatorProfile>>,
    latency: Option<Duration>,

    authenticated_calls: AtomicUsize,
    public_calls: AtomicUsize,
    search_calls: AtomicUsize,
    page_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_authenticated_listing(mut self, resource: &str, posts: Vec<Post>) -> Self {
        self.authenticated
            .insert(resource.to_lowercase(), Scripted::Respond(posts));
        self
    }

    pub fn failing_authenticated_listing(mut self, resource: &str, error: HarvestError) -> Self {
        self.authenticated
            .insert(resource.to_lowercase(), Scripted::Fail(error));
        self
    }

    pub fn on_public_listing(mut self, resource: &str, posts: Vec<Post>) -> Self {
        self.public
            .insert(resource.to_lowercase(), Scripted::Respond(posts));
        self
    }

    pub fn failing_public_listing(mut self, resource: &str, error: HarvestError) -> Self {
        self.public.insert(resource.to_lowercase(), Scripted::Fail(error));
        self
    }

    pub fn on_search(mut self, resource: &str, hits: Vec<SearchHit>) -> Self {
        self.searches
            .insert(resource.to_lowercase(), Scripted::Respond(hits));
        self
    }

    pub fn failing_search(mut self, resource: &str, error: HarvestError) -> Self {
        self.searches
            .insert(resource.to_lowercase(), Scripted::Fail(error));
        self
    }

    pub fn on_page(mut self, resource: &str, html: &str) -> Self {
        self.pages
            .insert(resource.to_lowercase(), Scripted::Respond(html.to_string()));
        self
    }

    pub fn on_profile(mut self, profile: CreatorProfile) -> Self {
        self.profiles
            .insert(profile.username.to_lowercase(), Scripted::Respond(profile));
        self
    }

    pub fn failing_profile(mut self, username: &str, error: HarvestError) -> Self {
        self.profiles
            .insert(username.to_lowercase(), Scripted::Fail(error));
        self
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn authenticated_calls(&self) -> usize {
        self.authenticated_calls.load(Ordering::SeqCst)
    }

    pub fn public_calls(&self) -> usize {
        self.public_calls.load(Ordering::SeqCst)
    }

    pub fn listing_calls(&self) -> usize {
        self.authenticated_calls() + self.public_calls()
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.listing_calls() + self.search_calls() + self.page_calls() + self.profile_calls()
    }

    /// Every URL, query or username passed in, in call order.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    async fn enter(&self, counter: &AtomicUsize, target: &str) {
        counter.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(target.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn lookup<T: Clone>(
        fixtures: &HashMap<String, Scripted<T>>,
        key: Option<String>,
        what: &str,
        target: &str,
    ) -> Result<T> {
        key.and_then(|k| fixtures.get(&k))
            .map(Scripted::play)
            .unwrap_or_else(|| {
                Err(HarvestError::external(
                    "mock",
                    Some(404),
                    format!("MockUpstream: no {what} registered for {target}"),
                ))
            })
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn listing(&self, url: &str, authenticated: bool) -> Result<Vec<Post>> {
        if authenticated {
            self.enter(&self.authenticated_calls, url).await;
            Self::lookup(&self.authenticated, resource_of(url), "authenticated listing", url)
        } else {
            self.enter(&self.public_calls, url).await;
            Self::lookup(&self.public, resource_of(url), "public listing", url)
        }
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.enter(&self.search_calls, query).await;
        let mut hits = Self::lookup(&self.searches, resource_of(query), "search", query)?;
        hits.truncate(max_results);
        Ok(hits)
    }

    async fn page(&self, url: &str) -> Result<String> {
        self.enter(&self.page_calls, url).await;
        Self::lookup(&self.pages, resource_of(url), "page", url)
    }

    async fn profile(&self, username: &str) -> Result<CreatorProfile> {
        self.enter(&self.profile_calls, username).await;
        Self::lookup(
            &self.profiles,
            Some(username.to_lowercase()),
            "profile",
            username,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_segment_is_found_in_urls_and_queries() {
        assert_eq!(
            resource_of("https://oauth.reddit.com/r/DataScience/hot?t=week").as_deref(),
            Some("datascience")
        );
        assert_eq!(
            resource_of("https://www.reddit.com/r/rust/hot.json").as_deref(),
            Some("rust")
        );
        assert_eq!(
            resource_of("site:reddit.com/r/rust").as_deref(),
            Some("rust")
        );
        assert_eq!(resource_of("https://example.com/"), None);
    }

    #[tokio::test]
    async fn unregistered_fixture_is_an_error() {
        let mock = MockUpstream::new().on_public_listing("rust", vec![post("a_user", "t", 1)]);

        assert!(mock.listing("https://x/r/rust/hot.json", false).await.is_ok());
        let err = mock.listing("https://x/r/rust/hot", true).await.unwrap_err();
        assert!(matches!(err, HarvestError::ExternalService { status: Some(404), .. }));
        assert_eq!(mock.public_calls(), 1);
        assert_eq!(mock.authenticated_calls(), 1);
    }
}
