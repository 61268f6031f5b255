//! Deduplication and ranking. Pure: no I/O, no clock, no randomness.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use creatorsignal_common::{RankedCreator, RawRecord};

pub const DEFAULT_LIMIT: usize = 15;

struct Group {
    username: String,
    resource: String,
    total_score: i64,
    post_count: usize,
    top_score: i64,
    top_title: String,
    top_link: String,
    last_seen: Option<DateTime<Utc>>,
}

impl Group {
    fn new(record: &RawRecord) -> Self {
        Self {
            username: record.identity.clone(),
            resource: record.resource.clone(),
            total_score: 0,
            post_count: 0,
            top_score: i64::MIN,
            top_title: String::new(),
            top_link: String::new(),
            last_seen: None,
        }
    }

    fn add(&mut self, record: &RawRecord) {
        self.total_score = self.total_score.saturating_add(record.score);
        self.post_count += 1;
        if record.score > self.top_score {
            self.top_score = record.score;
            self.top_title = record.title.clone();
            self.top_link = record.source_link.clone();
        }
        self.last_seen = self.last_seen.max(record.created_at);
    }
}

/// Group records by identity (case-insensitive, first-seen casing kept), sum
/// their scores, and rank by total score then record count, both descending.
/// Remaining ties keep first-seen order. The result holds at most `limit` entries.
pub fn aggregate(records: &[RawRecord], limit: usize) -> Vec<RankedCreator> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for record in records {
        let slot = *index
            .entry(record.identity.to_lowercase())
            .or_insert_with(|| {
                groups.push(Group::new(record));
                groups.len() - 1
            });
        groups[slot].add(record);
    }

    groups.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| b.post_count.cmp(&a.post_count))
    });
    groups.truncate(limit);

    groups
        .into_iter()
        .map(|g| RankedCreator {
            username: g.username,
            total_score: g.total_score,
            post_count: g.post_count,
            resource: g.resource,
            top_post_title: g.top_title,
            top_post_link: g.top_link,
            last_seen: g.last_seen,
            profile: None,
        })
        .collect()
}
