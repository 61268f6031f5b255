use chrono::{DateTime, Utc};
use creatorsignal_common::CreatorProfile;
use serde::Deserialize;

use crate::error::{RedditError, Result};

/// Response body of the client-credential token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until the token expires.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Reddit's `{ "kind": ..., "data": ... }` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<Thing<Post>>,
    pub after: Option<String>,
}

/// A single submission (`t3`) from a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub id: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub permalink: Option<String>,
    pub url: Option<String>,
    pub subreddit: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    pub created_utc: Option<f64>,
    #[serde(default)]
    pub stickied: bool,
}

impl Post {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_utc
            .and_then(|ts| DateTime::from_timestamp(ts as i64, 0))
    }

    /// Absolute link to the post's discussion page, falling back to its outbound URL.
    pub fn link(&self, base: &str) -> String {
        match self.permalink.as_deref() {
            Some(p) if p.starts_with("http") => p.to_string(),
            Some(p) => format!("{}{}", base.trim_end_matches('/'), p),
            None => self.url.clone().unwrap_or_default(),
        }
    }
}

/// Profile payload (`t2`) from `/user/{name}/about`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserAbout {
    pub name: String,
    #[serde(default)]
    pub link_karma: i64,
    #[serde(default)]
    pub comment_karma: i64,
    pub created_utc: Option<f64>,
    pub icon_img: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

impl UserAbout {
    pub fn into_profile(self) -> CreatorProfile {
        let created_at = self
            .created_utc
            .and_then(|ts| DateTime::from_timestamp(ts as i64, 0));
        // icon URLs come HTML-escaped unless raw_json=1 was honoured
        let icon_url = self
            .icon_img
            .filter(|u| !u.is_empty())
            .map(|u| u.replace("&amp;", "&"));
        CreatorProfile {
            username: self.name,
            link_karma: self.link_karma,
            comment_karma: self.comment_karma,
            created_at,
            icon_url,
            verified: self.verified,
        }
    }
}

/// Validate a listing envelope and return its submissions.
/// Anything that is not a `Listing` of `t3` things is a malformed payload.
pub fn listing_posts(value: serde_json::Value) -> Result<Vec<Post>> {
    let listing: Thing<ListingData> = serde_json::from_value(value)?;
    if listing.kind != "Listing" {
        return Err(RedditError::Parse(format!(
            "expected Listing, got kind '{}'",
            listing.kind
        )));
    }
    Ok(listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t3")
        .map(|child| child.data)
        .collect())
}

pub fn user_about(value: serde_json::Value) -> Result<UserAbout> {
    let thing: Thing<UserAbout> = serde_json::from_value(value)?;
    if thing.kind != "t2" {
        return Err(RedditError::Parse(format!(
            "expected t2 account, got kind '{}'",
            thing.kind
        )));
    }
    Ok(thing.data)
}
