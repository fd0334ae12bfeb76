//! XRPC wire types and their conversion into crawler-facing posts

use crate::api::media::{detect_media, LinkCard, MediaLink};
use crate::storage::NewPost;
use serde::{Deserialize, Serialize};

/// Request body for `com.atproto.server.createSession`
#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// Response from `com.atproto.server.createSession`
#[derive(Debug, Deserialize)]
pub(crate) struct CreateSessionResponse {
    #[serde(rename = "accessJwt")]
    pub access_jwt: String,
    pub did: String,
    pub handle: String,
}

/// Response from `com.atproto.identity.resolveHandle`
#[derive(Debug, Deserialize)]
pub(crate) struct ResolveHandleResponse {
    pub did: String,
}

/// Response from `app.bsky.feed.getQuotes`
#[derive(Debug, Deserialize)]
pub(crate) struct GetQuotesResponse {
    #[serde(default)]
    pub posts: Vec<PostView>,
    pub cursor: Option<String>,
}

/// Response from `app.bsky.feed.getPosts`
#[derive(Debug, Deserialize)]
pub(crate) struct GetPostsResponse {
    #[serde(default)]
    pub posts: Vec<PostView>,
}

/// Error body returned by XRPC endpoints
#[derive(Debug, Default, Deserialize)]
pub(crate) struct XrpcErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

/// A hydrated post as returned by feed endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostView {
    pub uri: String,
    pub cid: Option<String>,
    pub author: Author,
    #[serde(default)]
    pub record: PostRecordBody,
    pub indexed_at: Option<String>,
    pub like_count: Option<u64>,
    pub quote_count: Option<u64>,
    pub repost_count: Option<u64>,
    pub reply_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Author {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
}

/// The raw `app.bsky.feed.post` record
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostRecordBody {
    #[serde(default)]
    pub text: String,
    pub created_at: Option<String>,
    /// Kept raw so unknown embed types still report their `$type`
    pub embed: Option<serde_json::Value>,
    #[serde(default)]
    pub facets: Vec<Facet>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum RecordEmbed {
    #[serde(rename = "app.bsky.embed.external")]
    External { external: ExternalLink },
    #[serde(rename = "app.bsky.embed.record")]
    Record { record: StrongRef },
    #[serde(rename = "app.bsky.embed.recordWithMedia")]
    RecordWithMedia { record: RecordRef, media: MediaEmbed },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum MediaEmbed {
    #[serde(rename = "app.bsky.embed.external")]
    External { external: ExternalLink },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExternalLink {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StrongRef {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordRef {
    pub record: StrongRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Facet {
    #[serde(default)]
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(other)]
    Other,
}

/// A post observed on the remote service
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePost {
    pub uri: String,
    pub cid: Option<String>,
    pub author_did: String,
    pub author_handle: String,
    pub author_display_name: Option<String>,
    pub text: String,
    pub created_at: Option<String>,
    pub indexed_at: Option<String>,
    pub like_count: u64,
    /// None when the service did not report a quote count
    pub quote_count: Option<u64>,
    pub repost_count: u64,
    pub reply_count: u64,
    /// URI of the post this one quotes, if any
    pub quoted_uri: Option<String>,
    pub embed_type: Option<String>,
    pub media: Option<MediaLink>,
}

impl RemotePost {
    /// Converts into a storage row whose parent is the quoted post
    pub fn to_new_post(&self) -> NewPost {
        NewPost {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
            author_did: Some(self.author_did.clone()),
            author_handle: self.author_handle.clone(),
            author_display_name: self.author_display_name.clone(),
            text: self.text.clone(),
            created_at: self.created_at.clone(),
            indexed_at: self.indexed_at.clone(),
            like_count: self.like_count,
            quote_count: self.quote_count.unwrap_or(0),
            repost_count: self.repost_count,
            reply_count: self.reply_count,
            parent_uri: self.quoted_uri.clone(),
            embed_type: self.embed_type.clone(),
            media: self.media.clone(),
        }
    }
}

impl From<PostView> for RemotePost {
    fn from(view: PostView) -> Self {
        let record = view.record;
        let embed_type = record
            .embed
            .as_ref()
            .and_then(|e| e.get("$type"))
            .and_then(|t| t.as_str())
            .map(str::to_string);
        let embed = record
            .embed
            .and_then(|e| serde_json::from_value::<RecordEmbed>(e).ok());

        let (quoted_uri, card) = match &embed {
            Some(RecordEmbed::External { external }) => (None, Some(external)),
            Some(RecordEmbed::Record { record }) => (Some(record.uri.clone()), None),
            Some(RecordEmbed::RecordWithMedia { record, media }) => {
                let card = match media {
                    MediaEmbed::External { external } => Some(external),
                    MediaEmbed::Unknown => None,
                };
                (Some(record.record.uri.clone()), card)
            }
            Some(RecordEmbed::Unknown) | None => (None, None),
        };

        let facet_links: Vec<String> = record
            .facets
            .into_iter()
            .flat_map(|f| f.features)
            .filter_map(|feature| match feature {
                FacetFeature::Link { uri } => Some(uri),
                FacetFeature::Other => None,
            })
            .collect();

        let media = detect_media(
            card.map(|c| LinkCard {
                uri: &c.uri,
                title: &c.title,
                description: &c.description,
            }),
            &facet_links,
            &record.text,
        );

        Self {
            uri: view.uri,
            cid: view.cid,
            author_did: view.author.did,
            author_handle: view.author.handle,
            author_display_name: view.author.display_name.filter(|n| !n.is_empty()),
            text: record.text,
            created_at: record.created_at,
            indexed_at: view.indexed_at,
            like_count: view.like_count.unwrap_or(0),
            quote_count: view.quote_count,
            repost_count: view.repost_count.unwrap_or(0),
            reply_count: view.reply_count.unwrap_or(0),
            quoted_uri,
            embed_type,
            media,
        }
    }
}

/// One page of quotes for a post
#[derive(Debug, Clone, Default)]
pub struct QuotePage {
    pub posts: Vec<RemotePost>,
    /// Cursor for the next page; None when the listing is exhausted
    pub cursor: Option<String>,
}
