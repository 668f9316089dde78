//! Content kinds produced by the orchestrator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SkaldError;

/// What kind of blog content a request asks for.
///
/// Every content workflow (post body, title, excerpt, tags, comment draft)
/// goes through the same entry point; the kind drives the adapter's system
/// instruction, per-kind defaults and the structural part of quality scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Title,
    Body,
    Excerpt,
    TagList,
    Comment,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        ContentKind::Title,
        ContentKind::Body,
        ContentKind::Excerpt,
        ContentKind::TagList,
        ContentKind::Comment,
    ];

    /// Stable identifier used in cache fingerprints, metrics and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Title => "title",
            ContentKind::Body => "body",
            ContentKind::Excerpt => "excerpt",
            ContentKind::TagList => "tag_list",
            ContentKind::Comment => "comment",
        }
    }

    /// Default generation budget for this kind.
    pub fn default_max_tokens(&self) -> u32 {
        match self {
            ContentKind::Title => 100,
            ContentKind::Body => 1000,
            ContentKind::Excerpt => 100,
            ContentKind::TagList => 100,
            ContentKind::Comment => 200,
        }
    }

    /// Default sampling temperature for this kind.
    pub fn default_temperature(&self) -> f32 {
        match self {
            ContentKind::Title => 0.8,
            ContentKind::Body => 0.7,
            ContentKind::Excerpt => 0.6,
            ContentKind::TagList => 0.5,
            ContentKind::Comment => 0.7,
        }
    }

    /// Whether the kind is expected to carry multi-paragraph structure.
    pub fn is_long_form(&self) -> bool {
        matches!(self, ContentKind::Body)
    }

    pub(crate) fn instruction(&self) -> &'static str {
        match self {
            ContentKind::Title => {
                "Write a single informative, engaging blog post title. Reply with the title only."
            }
            ContentKind::Body => {
                "Write a well-structured blog article with headings and paragraphs."
            }
            ContentKind::Excerpt => "Write a short summary of the article for a post excerpt.",
            ContentKind::TagList => {
                "Produce short, relevant tags for the article as a comma-separated list."
            }
            ContentKind::Comment => {
                "Write a relevant, constructive reader comment that adds to the discussion."
            }
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = SkaldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "title" => Ok(ContentKind::Title),
            "body" | "post" => Ok(ContentKind::Body),
            "excerpt" | "description" => Ok(ContentKind::Excerpt),
            "tag_list" | "tags" => Ok(ContentKind::TagList),
            "comment" => Ok(ContentKind::Comment),
            other => Err(SkaldError::Validation(format!(
                "unsupported content kind: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("tags".parse::<ContentKind>().unwrap(), ContentKind::TagList);
        assert_eq!("Tag-List".parse::<ContentKind>().unwrap(), ContentKind::TagList);
        assert_eq!("post".parse::<ContentKind>().unwrap(), ContentKind::Body);
        assert!("video".parse::<ContentKind>().is_err());
    }

    #[test]
    fn as_str_round_trips_through_from_str() {
        for kind in ContentKind::ALL {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
    }
}
