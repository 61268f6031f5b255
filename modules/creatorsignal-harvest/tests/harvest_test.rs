//! End-to-end harvests against `MockUpstream` through the default strategy table.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use creatorsignal_common::{
    ChainState, HarvestError, HarvestOptions, StrategyOutcome, LISTING_NAMESPACE,
};
use creatorsignal_harvest::testing::{hit, post, profile, MockUpstream};
use creatorsignal_harvest::Harvester;

fn harvester(mock: &Arc<MockUpstream>) -> Harvester {
    Harvester::builder(mock.clone()).build()
}

/// Five submissions from three creators, scores [10, 5, 8, 2, 1].
fn datascience_posts() -> Vec<reddit_client::Post> {
    vec![
        post("alice", "Feature stores compared", 10),
        post("bob", "Weekly thread", 5),
        post("alice", "Notebook tips", 8),
        post("carol", "First post", 2),
        post("bob", "Follow-up", 1),
    ]
}

fn many_authors(n: usize) -> Vec<reddit_client::Post> {
    (0..n)
        .map(|i| post(&format!("creator_{i:02}"), &format!("Post number {i}"), 100 - i as i64))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn ranks_creators_by_summed_score() {
    let mock = Arc::new(MockUpstream::new().on_authenticated_listing("datascience", datascience_posts()));

    let result = harvester(&mock)
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();

    let ranked: Vec<_> = result
        .records
        .iter()
        .map(|r| (r.username.as_str(), r.total_score, r.post_count))
        .collect();
    assert_eq!(ranked, vec![("alice", 18, 2), ("bob", 6, 2), ("carol", 2, 1)]);
    assert_eq!(result.total, 3);
    assert_eq!(result.records[0].top_post_title, "Feature stores compared");
    assert!(!result.cache_hit);

    // Five unique records never reach the default threshold of ten, so every
    // remaining strategy runs and fails against the unscripted mock.
    assert_eq!(result.state, ChainState::Exhausted);
    assert_eq!(result.strategies.len(), 4);
    assert_eq!(result.strategies[0].outcome, StrategyOutcome::Ok);
    assert_eq!(result.strategies[0].yielded, 5);
    assert!(result.strategies[1..]
        .iter()
        .all(|s| matches!(s.outcome, StrategyOutcome::Failed(_))));
}

#[tokio::test(start_paused = true)]
async fn sufficient_first_strategy_skips_the_rest() {
    let mock = Arc::new(MockUpstream::new().on_authenticated_listing("datascience", many_authors(12)));

    let result = harvester(&mock)
        .harvest("datascience", HarvestOptions::default().limit(5))
        .await
        .unwrap();

    assert_eq!(result.state, ChainState::Sufficient);
    assert_eq!(result.records.len(), 5);
    assert_eq!(mock.authenticated_calls(), 1);
    assert_eq!(mock.public_calls(), 0);
    assert_eq!(mock.search_calls(), 0);
    assert_eq!(mock.page_calls(), 0);
    assert!(result.strategies[1..]
        .iter()
        .all(|s| s.outcome == StrategyOutcome::Skipped));
}

#[tokio::test(start_paused = true)]
async fn output_is_bounded_and_unique_ignoring_case() {
    let mut posts = many_authors(20);
    posts.push(post("CREATOR_00", "Shouting", 3));
    let mock = Arc::new(MockUpstream::new().on_authenticated_listing("datascience", posts));

    let result = harvester(&mock)
        .harvest("datascience", HarvestOptions::default().limit(7))
        .await
        .unwrap();

    assert_eq!(result.records.len(), 7);
    let names: HashSet<_> = result.records.iter().map(|r| r.username.to_lowercase()).collect();
    assert_eq!(names.len(), 7);
    assert_eq!(result.records[0].username, "creator_00");
    assert_eq!(result.records[0].total_score, 103);
}

#[tokio::test(start_paused = true)]
async fn invalid_requests_never_touch_upstreams() {
    let mock = Arc::new(MockUpstream::new().on_authenticated_listing("datascience", datascience_posts()));
    let harvester = harvester(&mock);

    for bad in ["ab", "way_too_long_community_name", "data science", "_leading", ""] {
        let err = harvester
            .harvest(bad, HarvestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Validation(_)), "{bad}: {err:?}");
    }
    let err = harvester
        .harvest("datascience", HarvestOptions::default().limit(0))
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Validation(_)));

    assert_eq!(mock.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn second_call_is_served_from_cache() {
    let mock = Arc::new(MockUpstream::new().on_authenticated_listing("datascience", datascience_posts()));
    let harvester = harvester(&mock);

    let first = harvester
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();
    let calls_after_first = mock.total_calls();

    let second = harvester
        .harvest("r/DataScience", HarvestOptions::default())
        .await
        .unwrap();

    assert!(second.cache_hit);
    assert_eq!(second.records, first.records);
    assert_eq!(mock.total_calls(), calls_after_first);

    let stats = harvester.cache_stats().await;
    assert_eq!(stats.hits, 1);
}

#[tokio::test(start_paused = true)]
async fn force_refresh_bypasses_the_cache() {
    let mock = Arc::new(MockUpstream::new().on_authenticated_listing("datascience", datascience_posts()));
    let harvester = harvester(&mock);

    harvester
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();
    let refreshed = harvester
        .harvest("datascience", HarvestOptions::default().force_refresh(true))
        .await
        .unwrap();

    assert!(!refreshed.cache_hit);
    assert_eq!(mock.authenticated_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cached_entries_expire_with_the_listing_ttl() {
    let mock = Arc::new(MockUpstream::new().on_authenticated_listing("datascience", datascience_posts()));
    let harvester = harvester(&mock);

    harvester
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(901)).await;
    let later = harvester
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();

    assert!(!later.cache_hit);
    assert_eq!(mock.authenticated_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_requests_share_one_execution() {
    let mock = Arc::new(
        MockUpstream::new()
            .on_authenticated_listing("datascience", many_authors(12))
            .with_latency(Duration::from_secs(1)),
    );
    let harvester = harvester(&mock);

    let calls = (0..5).map(|_| harvester.harvest("datascience", HarvestOptions::default()));
    let results = futures::future::join_all(calls).await;

    assert_eq!(mock.authenticated_calls(), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert_eq!(result.as_ref().unwrap().records, first.records);
    }
}

#[tokio::test(start_paused = true)]
async fn different_options_are_not_collapsed() {
    let mock = Arc::new(
        MockUpstream::new()
            .on_authenticated_listing("datascience", many_authors(12))
            .with_latency(Duration::from_secs(1)),
    );
    let harvester = harvester(&mock);

    let (a, b) = tokio::join!(
        harvester.harvest("datascience", HarvestOptions::default()),
        harvester.harvest("datascience", HarvestOptions::default().limit(3)),
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(mock.authenticated_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_caller_does_not_cancel_the_shared_execution() {
    let mock = Arc::new(
        MockUpstream::new()
            .on_authenticated_listing("datascience", many_authors(12))
            .with_latency(Duration::from_secs(2)),
    );
    let harvester = harvester(&mock);

    let h1 = harvester.clone();
    let first = tokio::spawn(async move { h1.harvest("datascience", HarvestOptions::default()).await });
    let h2 = harvester.clone();
    let second = tokio::spawn(async move { h2.harvest("datascience", HarvestOptions::default()).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    first.abort();

    let result = second.await.unwrap().unwrap();
    assert_eq!(result.records.len(), 12);
    assert_eq!(mock.authenticated_calls(), 1);

    // The execution still wrote the cache.
    let cached = harvester
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();
    assert!(cached.cache_hit);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_primary_falls_through_to_public_listing() {
    let mock = Arc::new(
        MockUpstream::new()
            .failing_authenticated_listing(
                "datascience",
                HarvestError::RateLimited {
                    origin: "reddit".into(),
                    retry_after: Some(Duration::from_secs(3)),
                },
            )
            .on_public_listing("datascience", datascience_posts()),
    );

    let result = harvester(&mock)
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();

    assert!(matches!(result.strategies[0].outcome, StrategyOutcome::Failed(_)));
    assert_eq!(result.strategies[1].outcome, StrategyOutcome::Ok);
    assert_eq!(result.records[0].username, "alice");
    assert_eq!(result.records[0].total_score, 18);
}

#[tokio::test(start_paused = true)]
async fn search_discovery_extracts_identities_from_text() {
    let mock = Arc::new(MockUpstream::new().on_search(
        "datascience",
        vec![
            hit(
                "Best plotting library? : r/datascience",
                "submitted 3 days ago by plot_wizard in r/datascience",
                "https://www.reddit.com/r/datascience/comments/abc/best_plotting/",
            ),
            hit(
                "Career advice",
                "As u/career_coach said, start small",
                "https://www.reddit.com/r/datascience/comments/def/career/",
            ),
            hit(
                "Profile",
                "Posts and comments",
                "https://www.reddit.com/user/profile_owner/",
            ),
            hit(
                "Removed thread",
                "posted by AutoModerator",
                "https://www.reddit.com/r/datascience/comments/ghi/removed/",
            ),
        ],
    ));

    let result = harvester(&mock)
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();

    let mut names: Vec<_> = result.records.iter().map(|r| r.username.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["career_coach", "plot_wizard", "profile_owner"]);
    assert!(result.records.iter().all(|r| r.total_score == 1));
    assert_eq!(result.strategies[2].yielded, 3);
}

#[tokio::test(start_paused = true)]
async fn markup_fallback_reads_listing_pages() {
    let page = r#"
        <div class=" thing id-t3_a link" data-author="markup_maker" data-score="40"
             data-permalink="/r/datascience/comments/a/one/">
            <a class="title" href="/r/datascience/comments/a/one/">One</a>
        </div>
        <div class=" thing id-t3_b link" data-author="[deleted]" data-score="9"
             data-permalink="/r/datascience/comments/b/two/">
            <a class="title" href="/r/datascience/comments/b/two/">Two</a>
            <p>submitted by second_maker</p>
        </div>
    "#;
    let mock = Arc::new(MockUpstream::new().on_page("datascience", page));

    let result = harvester(&mock)
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();

    let ranked: Vec<_> = result
        .records
        .iter()
        .map(|r| (r.username.as_str(), r.total_score))
        .collect();
    assert_eq!(ranked, vec![("markup_maker", 40), ("second_maker", 9)]);
    assert_eq!(
        result.records[0].top_post_link,
        "https://old.reddit.com/r/datascience/comments/a/one/"
    );
}

#[tokio::test(start_paused = true)]
async fn every_strategy_failing_is_an_empty_success() {
    let mock = Arc::new(MockUpstream::new());
    let harvester = harvester(&mock);

    let result = harvester
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();

    assert!(result.records.is_empty());
    assert_eq!(result.total, 0);
    assert_eq!(result.state, ChainState::Exhausted);
    assert_eq!(mock.total_calls(), 4);

    // Empty outcomes are not cached.
    let again = harvester
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();
    assert!(!again.cache_hit);
    assert_eq!(mock.total_calls(), 8);
}

#[tokio::test(start_paused = true)]
async fn profiles_are_attached_and_cached() {
    let mock = Arc::new(
        MockUpstream::new()
            .on_authenticated_listing("datascience", datascience_posts())
            .on_profile(profile("alice"))
            .on_profile(profile("bob"))
            .failing_profile("carol", HarvestError::external("reddit", Some(404), "not found")),
    );
    let harvester = harvester(&mock);
    let options = HarvestOptions::default().include_profiles(true);

    let result = harvester.harvest("datascience", options.clone()).await.unwrap();

    assert_eq!(result.records[0].profile.as_ref().unwrap().username, "alice");
    assert_eq!(result.records[1].profile.as_ref().unwrap().link_karma, 1200);
    assert!(result.records[2].profile.is_none());
    assert_eq!(mock.profile_calls(), 3);

    // Refreshing the listing reuses cached profiles; the failed one is retried.
    harvester
        .harvest("datascience", options.force_refresh(true))
        .await
        .unwrap();
    assert_eq!(mock.profile_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn profiles_are_not_fetched_unless_asked() {
    let mock = Arc::new(
        MockUpstream::new()
            .on_authenticated_listing("datascience", datascience_posts())
            .on_profile(profile("alice")),
    );

    let result = harvester(&mock)
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();

    assert!(result.records.iter().all(|r| r.profile.is_none()));
    assert_eq!(mock.profile_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn flush_drops_cached_listings() {
    let mock = Arc::new(MockUpstream::new().on_authenticated_listing("datascience", datascience_posts()));
    let harvester = harvester(&mock);

    harvester
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();
    assert_eq!(harvester.cache_stats().await.entries, 1);
    assert_eq!(harvester.flush(LISTING_NAMESPACE).await, 1);

    let result = harvester
        .harvest("datascience", HarvestOptions::default())
        .await
        .unwrap();
    assert!(!result.cache_hit);
}

#[tokio::test]
async fn response_envelope_carries_structured_errors() {
    let mock = Arc::new(MockUpstream::new());
    let response = harvester(&mock)
        .harvest_response("x", HarvestOptions::default())
        .await;

    assert!(!response.ok);
    assert!(response.data.is_none());
    assert_eq!(response.error.unwrap().kind, "validation");
}
