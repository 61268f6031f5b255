// Split a listing page into per-post text blocks for the markup extractor.
//
// Old-style listing pages wrap every submission in `<div class="... thing ...">`
// with data attributes for author, score, permalink and timestamp. Pages
// without that structure fall back to paragraph blocks of plain text.

use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;

use crate::extract::TextDoc;

static THING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div\b[^>]*\bclass="[^"]*\bthing\b[^"]*"[^>]*>"#).expect("valid regex")
});
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a\b[^>]*\bclass="[^"]*\btitle\b[^"]*"[^>]*>([^<]+)</a>"#).expect("valid regex")
});
static PERMALINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-permalink="([^"]+)""#).expect("valid regex"));
static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-score="(-?\d+)""#).expect("valid regex"));
static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-timestamp="(\d+)""#).expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Break `html` into documents. `base` resolves relative permalinks; `page_url`
/// is the link attached to plain-text fallback blocks.
pub fn split_blocks(html: &str, base: &str, page_url: &str) -> Vec<TextDoc> {
    let starts: Vec<usize> = THING_RE.find_iter(html).map(|m| m.start()).collect();
    if starts.is_empty() {
        return plain_blocks(html, page_url);
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(html.len());
            let block = &html[start..end];
            let link = match capture(&PERMALINK_RE, block) {
                Some(p) if p.starts_with("http") => p.to_string(),
                Some(p) => format!("{}{}", base.trim_end_matches('/'), p),
                None => page_url.to_string(),
            };
            TextDoc {
                title: capture(&TITLE_RE, block)
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default(),
                snippet: block.to_string(),
                link,
                score: capture(&SCORE_RE, block)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1),
                timestamp: capture(&TIMESTAMP_RE, block)
                    .and_then(|ms| ms.parse::<i64>().ok())
                    .and_then(DateTime::from_timestamp_millis),
            }
        })
        .collect()
}

fn plain_blocks(text: &str, page_url: &str) -> Vec<TextDoc> {
    let stripped = TAG_RE.replace_all(text, "\n");
    stripped
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| TextDoc {
            title: String::new(),
            snippet: block.to_string(),
            link: page_url.to_string(),
            score: 1,
            timestamp: None,
        })
        .collect()
}
