// Identity extraction from unstructured text.
//
// Patterns are a declarative, ordered table. For each record the text is
// title + snippet + link; patterns run in order and the first capture that
// survives the filter is the record's identity. Nothing else in that record
// is looked at.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use creatorsignal_common::{is_valid_identity, ExtractedCreator};
use regex::Regex;

/// One row of a pattern table. Capture group 1 is the candidate identity.
#[derive(Debug, Clone, Copy)]
pub struct PatternRule {
    pub name: &'static str,
    pub regex: &'static str,
}

const PROFILE_LINK: PatternRule = PatternRule {
    name: "profile_link",
    regex: r"(?i)reddit\.com/(?:user|u)/([A-Za-z0-9_-]+)",
};

const SUBMITTED_BY: PatternRule = PatternRule {
    name: "submitted_by",
    regex: r"(?i)\b(?:submitted|posted)\b[^\n.]{0,40}?\bby\s+(?:/?u/)?([A-Za-z0-9_-]+)",
};

const INLINE_MENTION: PatternRule = PatternRule {
    name: "inline_mention",
    regex: r"(?:^|[\s(\[,;:])/?u/([A-Za-z0-9_-]+)",
};

const DATA_AUTHOR: PatternRule = PatternRule {
    name: "data_author",
    regex: r#"data-author="([^"]+)""#,
};

/// Search-engine titles and snippets.
pub const DISCOVERY_RULES: &[PatternRule] = &[PROFILE_LINK, SUBMITTED_BY, INLINE_MENTION];

/// Listing page markup.
pub const MARKUP_RULES: &[PatternRule] = &[DATA_AUTHOR, PROFILE_LINK, SUBMITTED_BY];

/// Sentinel and system identities that are never creators.
pub const DENYLIST: &[&str] = &[
    "deleted",
    "removed",
    "automoderator",
    "reddit",
    "moderator",
    "modteam",
    "modmail",
    "username",
];

#[derive(Debug)]
pub struct Pattern {
    pub name: &'static str,
    regex: Regex,
}

fn compile(rules: &[PatternRule]) -> Vec<Pattern> {
    rules
        .iter()
        .map(|r| Pattern {
            name: r.name,
            regex: Regex::new(r.regex).expect("valid regex"),
        })
        .collect()
}

static DISCOVERY: LazyLock<Vec<Pattern>> = LazyLock::new(|| compile(DISCOVERY_RULES));
static MARKUP: LazyLock<Vec<Pattern>> = LazyLock::new(|| compile(MARKUP_RULES));

/// Which pattern table a strategy extracts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSet {
    Discovery,
    Markup,
}

impl PatternSet {
    pub fn patterns(&self) -> &'static [Pattern] {
        match self {
            PatternSet::Discovery => &DISCOVERY,
            PatternSet::Markup => &MARKUP,
        }
    }
}

/// One unit of unstructured input: a search hit or a block of page markup.
#[derive(Debug, Clone, Default)]
pub struct TextDoc {
    pub title: String,
    pub snippet: String,
    pub link: String,
    pub score: i64,
    pub timestamp: Option<DateTime<Utc>>,
}

pub struct Extractor {
    resource: String,
    patterns: &'static [Pattern],
    denylist: HashSet<String>,
}

impl Extractor {
    pub fn new(resource: &str, set: PatternSet) -> Self {
        let mut denylist: HashSet<String> = DENYLIST.iter().map(|s| s.to_string()).collect();
        denylist.insert(resource.to_lowercase());
        Self {
            resource: resource.to_string(),
            patterns: set.patterns(),
            denylist,
        }
    }

    /// Length, charset and denylist filter shared by every identity source.
    pub fn accepts(&self, candidate: &str) -> bool {
        is_valid_identity(candidate) && !self.denylist.contains(&candidate.to_lowercase())
    }

    /// First acceptable identity in `text`, trying patterns in table order.
    pub fn candidate(&self, text: &str) -> Option<String> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .regex
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str())
                .find(|name| self.accepts(name))
                .map(str::to_string)
        })
    }

    /// One extraction pass over many records. At most one identity per record;
    /// identities are unique case-insensitively and keep their first-seen casing.
    pub fn extract(&self, docs: &[TextDoc]) -> Vec<ExtractedCreator> {
        let mut seen = HashSet::new();
        docs.iter()
            .filter_map(|doc| {
                let text = format!("{}\n{}\n{}", doc.title, doc.snippet, doc.link);
                let username = self.candidate(&text)?;
                seen.insert(username.to_lowercase()).then(|| ExtractedCreator {
                    username,
                    source_link: doc.link.clone(),
                    score: doc.score,
                    resource: self.resource.clone(),
                    timestamp: doc.timestamp,
                    title: doc.title.clone(),
                })
            })
            .collect()
    }
}
