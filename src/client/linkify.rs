//! Turns e-mail addresses and absolute http(s) URLs in assistant text into
//! link segments.
//!
//! Addresses are found first, then URLs in the text that remains between
//! them. Each pattern makes one left-to-right pass with non-overlapping
//! matches. Link segments are never rescanned, so running
//! [`linkify_segments`] over its own output changes nothing.
//!
//! Matching is deliberately loose: trailing punctuation such as the full
//! stop in `see https://example.com.` stays part of the match.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9._-]+@[a-zA-Z0-9._-]+\.[a-zA-Z0-9._-]+").ok());

static URL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)https?://[^\s]+").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Email,
    Url,
}

impl LinkKind {
    fn href(self, matched: &str) -> String {
        match self {
            Self::Email => format!("mailto:{matched}"),
            Self::Url => matched.to_owned(),
        }
    }
}

/// A piece of formatted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Text(String),
    Link {
        kind: LinkKind,
        href: String,
        text: String,
    },
}

impl Segment {
    /// The text a reader sees.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) | Self::Link { text, .. } => text,
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Self::Link { .. })
    }
}

/// Splits `text` into plain and link segments.
///
/// ```
/// use chatrelay::client::linkify::{linkify, LinkKind, Segment};
///
/// let segments = linkify("write to hi@studio.example");
/// assert_eq!(segments[0], Segment::Text("write to ".to_owned()));
/// assert!(matches!(&segments[1], Segment::Link { kind: LinkKind::Email, .. }));
/// ```
pub fn linkify(text: &str) -> Vec<Segment> {
    linkify_segments(vec![Segment::Text(text.to_owned())])
}

/// Linkifies the plain segments of `segments`, leaving links untouched.
pub fn linkify_segments(segments: Vec<Segment>) -> Vec<Segment> {
    let segments = split_matches(segments, &EMAIL, LinkKind::Email);
    split_matches(segments, &URL, LinkKind::Url)
}

fn split_matches(segments: Vec<Segment>, pattern: &LazyLock<Option<Regex>>, kind: LinkKind) -> Vec<Segment> {
    let Some(pattern) = pattern.as_ref() else {
        return segments;
    };

    let mut out = Vec::with_capacity(segments.len());
    for segment in segments {
        let text = match segment {
            Segment::Text(text) if !text.is_empty() => text,
            Segment::Text(_) => continue,
            link => {
                out.push(link);
                continue;
            }
        };

        let mut last = 0;
        for found in pattern.find_iter(&text) {
            if found.start() > last {
                out.push(Segment::Text(text[last..found.start()].to_owned()));
            }
            out.push(Segment::Link {
                kind,
                href: kind.href(found.as_str()),
                text: found.as_str().to_owned(),
            });
            last = found.end();
        }
        if last == 0 {
            out.push(Segment::Text(text));
        } else if last < text.len() {
            out.push(Segment::Text(text[last..].to_owned()));
        }
    }
    out
}

/// Renders segments as HTML. All text, including link targets, is escaped.
pub fn render_html(segments: &[Segment]) -> String {
    let mut html = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => escape_into(&mut html, text),
            Segment::Link { kind, href, text } => {
                html.push_str("<a href=\"");
                escape_into(&mut html, href);
                html.push('"');
                if *kind == LinkKind::Url {
                    html.push_str(" target=\"_blank\" rel=\"noopener noreferrer\"");
                }
                html.push('>');
                escape_into(&mut html, text);
                html.push_str("</a>");
            }
        }
    }
    html
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}
