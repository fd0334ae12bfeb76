//! Media link detection
//!
//! A post's media link comes from, in order of preference: its external link
//! card, a link facet in its text, or a bare URL in its text. Link cards
//! always count as media; facets and bare URLs only count when they point at
//! a recognized music or video host.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("static regex"));

const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];

const OTHER_MEDIA_HOSTS: &[&str] = &[
    "spotify.com",
    "spotify.link",
    "music.apple.com",
    "itunes.apple.com",
];

/// Kind of a detected media link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    OtherMedia,
}

impl MediaKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::OtherMedia => "other_media",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "video" => Some(Self::Video),
            "other_media" => Some(Self::OtherMedia),
            _ => None,
        }
    }
}

/// A media link detected on a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLink {
    pub kind: MediaKind,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// An external link card attached to a post
#[derive(Debug, Clone, Copy)]
pub struct LinkCard<'a> {
    pub uri: &'a str,
    pub title: &'a str,
    pub description: &'a str,
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Classifies a URL by host, returning None for unrecognized hosts
pub fn classify_url(raw: &str) -> Option<MediaKind> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    if VIDEO_HOSTS.iter().any(|d| host_matches(&host, d)) {
        Some(MediaKind::Video)
    } else if OTHER_MEDIA_HOSTS.iter().any(|d| host_matches(&host, d)) {
        Some(MediaKind::OtherMedia)
    } else {
        None
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Detects the media link of a post
pub fn detect_media(
    card: Option<LinkCard<'_>>,
    facet_links: &[String],
    text: &str,
) -> Option<MediaLink> {
    if let Some(card) = card.filter(|c| !c.uri.is_empty()) {
        return Some(MediaLink {
            kind: classify_url(card.uri).unwrap_or(MediaKind::OtherMedia),
            url: card.uri.to_string(),
            title: non_empty(card.title),
            description: non_empty(card.description),
        });
    }

    let from_text = BARE_URL
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', '!', '?']));

    facet_links
        .iter()
        .map(String::as_str)
        .chain(from_text)
        .find_map(|link| {
            classify_url(link).map(|kind| MediaLink {
                kind,
                url: link.to_string(),
                title: None,
                description: None,
            })
        })
}
