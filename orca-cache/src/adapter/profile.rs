//! Profile records.

use async_trait::async_trait;
use orca_core::{AdapterError, EntityType, Follow, Key, Profile, ProfileKind};
use serde::{Deserialize, Serialize};

use super::EntityAdapter;

const EDITABLE_KIND: i32 = 0;
const FOLLOWABLE_KIND: i32 = 1;

/// Primitive information persisted about a [`Profile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: Key,
    pub account: String,
    pub avatar_url: String,
    pub name: String,
    pub bio: String,
    /// `0` for the signed-in account's own profile, `1` for anyone else's.
    pub kind: i32,
    /// String form of the [`Follow`] status; only set for followable profiles.
    pub follow: Option<String>,
    pub follower_count: u32,
    pub following_count: u32,
    pub url: String,
}

/// Adapter for profiles. Profiles reference no other entity type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileAdapter;

#[async_trait]
impl EntityAdapter for ProfileAdapter {
    type Entity = Profile;
    type Record = ProfileRecord;

    fn entity_type(&self) -> EntityType {
        EntityType::Profile
    }

    fn to_record(&self, key: &Key, profile: &Profile) -> Result<ProfileRecord, AdapterError> {
        if &profile.id != key {
            return Err(AdapterError::Encode {
                entity_type: EntityType::Profile,
                key: key.clone(),
                reason: format!("profile id {} does not match its key", profile.id),
            });
        }
        let (kind, follow) = match profile.kind {
            ProfileKind::Editable => (EDITABLE_KIND, None),
            ProfileKind::Followable { follow } => (FOLLOWABLE_KIND, Some(follow.to_string())),
        };
        Ok(ProfileRecord {
            id: profile.id.clone(),
            account: profile.account.clone(),
            avatar_url: profile.avatar_url.clone(),
            name: profile.name.clone(),
            bio: profile.bio.clone(),
            kind,
            follow,
            follower_count: profile.follower_count,
            following_count: profile.following_count,
            url: profile.url.clone(),
        })
    }

    async fn from_record(
        &self,
        key: &Key,
        record: ProfileRecord,
    ) -> Result<Profile, AdapterError> {
        let kind = match record.kind {
            EDITABLE_KIND => ProfileKind::Editable,
            FOLLOWABLE_KIND => {
                let raw = record.follow.as_deref().ok_or_else(|| AdapterError::Decode {
                    entity_type: EntityType::Profile,
                    key: key.clone(),
                    reason: "followable profile has no follow status".to_string(),
                })?;
                let follow = Follow::parse(raw).ok_or_else(|| AdapterError::UnknownVariant {
                    entity_type: EntityType::Profile,
                    key: key.clone(),
                    field: "follow".to_string(),
                    value: raw.to_string(),
                })?;
                ProfileKind::Followable { follow }
            }
            other => {
                return Err(AdapterError::UnknownVariant {
                    entity_type: EntityType::Profile,
                    key: key.clone(),
                    field: "kind".to_string(),
                    value: other.to_string(),
                })
            }
        };
        Ok(Profile {
            id: record.id,
            account: record.account,
            avatar_url: record.avatar_url,
            name: record.name,
            bio: record.bio,
            kind,
            follower_count: record.follower_count,
            following_count: record.following_count,
            url: record.url,
        })
    }
}
