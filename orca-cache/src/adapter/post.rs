//! Post records.
//!
//! A post's author and reblogger are stored as profile keys and resolved
//! through a [`Resolver<Profile>`] on the way out, so profile details are
//! never duplicated inside post records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orca_core::{
    AdapterError, Author, Content, EntityType, Headline, Key, Post, Profile, Resolver,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::EntityAdapter;

/// Primitive information persisted about a [`Post`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Key,
    pub author_id: Key,
    pub reblogger_id: Option<Key>,
    pub text: String,
    pub headline_title: Option<String>,
    pub headline_subtitle: Option<String>,
    pub headline_cover_url: Option<String>,
    /// RFC 3339 publication time.
    pub published_at: String,
    pub comment_count: u32,
    pub is_favorite: bool,
    pub favorite_count: u32,
    pub is_reblogged: bool,
    pub reblog_count: u32,
    pub url: String,
}

/// Adapter for posts, resolving authors through the profile cache.
#[derive(Clone)]
pub struct PostAdapter {
    profiles: Arc<dyn Resolver<Profile>>,
}

impl PostAdapter {
    pub fn new(profiles: Arc<dyn Resolver<Profile>>) -> Self {
        Self { profiles }
    }

    async fn resolve_author(&self, post: &Key, profile: &Key) -> Result<Author, AdapterError> {
        match self.profiles.resolve(profile).await {
            Ok(profile) => Ok(profile.to_author()),
            Err(e) => {
                debug!(post = %post, profile = %profile, error = %e, "Author resolution failed");
                Err(AdapterError::UnresolvedReference {
                    entity_type: EntityType::Post,
                    key: post.clone(),
                    reference_type: EntityType::Profile,
                    reference_key: profile.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl EntityAdapter for PostAdapter {
    type Entity = Post;
    type Record = PostRecord;

    fn entity_type(&self) -> EntityType {
        EntityType::Post
    }

    fn to_record(&self, key: &Key, post: &Post) -> Result<PostRecord, AdapterError> {
        if &post.id != key {
            return Err(AdapterError::Encode {
                entity_type: EntityType::Post,
                key: key.clone(),
                reason: format!("post id {} does not match its key", post.id),
            });
        }
        let headline = post.content.headline.as_ref();
        Ok(PostRecord {
            id: post.id.clone(),
            author_id: post.author.id.clone(),
            reblogger_id: post.reblogger.as_ref().map(|r| r.id.clone()),
            text: post.content.text.clone(),
            headline_title: headline.map(|h| h.title.clone()),
            headline_subtitle: headline.and_then(|h| h.subtitle.clone()),
            headline_cover_url: headline.map(|h| h.cover_url.clone()),
            published_at: post.published_at.to_rfc3339(),
            comment_count: post.comment_count,
            is_favorite: post.is_favorite,
            favorite_count: post.favorite_count,
            is_reblogged: post.is_reblogged,
            reblog_count: post.reblog_count,
            url: post.url.clone(),
        })
    }

    async fn from_record(&self, key: &Key, record: PostRecord) -> Result<Post, AdapterError> {
        let published_at = DateTime::parse_from_rfc3339(&record.published_at)
            .map_err(|e| AdapterError::Decode {
                entity_type: EntityType::Post,
                key: key.clone(),
                reason: format!("invalid published_at {:?}: {}", record.published_at, e),
            })?
            .with_timezone(&Utc);

        let author = self.resolve_author(key, &record.author_id).await?;
        let reblogger = match &record.reblogger_id {
            Some(id) => Some(self.resolve_author(key, id).await?),
            None => None,
        };

        let headline = match (record.headline_title, record.headline_cover_url) {
            (Some(title), Some(cover_url)) => Some(Headline {
                title,
                subtitle: record.headline_subtitle,
                cover_url,
            }),
            _ => None,
        };

        Ok(Post {
            id: record.id,
            author,
            reblogger,
            content: Content {
                text: record.text,
                headline,
            },
            published_at,
            comment_count: record.comment_count,
            is_favorite: record.is_favorite,
            favorite_count: record.favorite_count,
            is_reblogged: record.is_reblogged,
            reblog_count: record.reblog_count,
            url: record.url,
        })
    }
}
