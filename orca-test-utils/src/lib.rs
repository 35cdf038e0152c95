//! Orca Test Utilities
//!
//! Shared test infrastructure for the Orca workspace:
//! - Scriptable fetchers that count and gate their calls
//! - Proptest generators for entity types
//! - Test fixtures for common scenarios
//! - Custom assertions for Orca error variants

pub use orca_core::{
    AdapterError, Author, CacheConfig, Content, EntityType, FetchError, Fetcher, Follow,
    Headline, Key, ManualClock, OrcaError, OrcaResult, Post, Profile, ProfileKind,
    StorageError, Timestamp,
};

use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber.
///
/// Honours `RUST_LOG`, defaulting to `orca_cache=debug`. Safe to call from
/// every test; only the first call installs anything.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("orca_cache=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// FETCHERS
// ============================================================================

pub mod fetchers {
    //! Fetchers whose behaviour tests script with a closure.

    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, Semaphore};

    type Respond<T> = Box<dyn Fn(&Key) -> Result<T, FetchError> + Send + Sync>;

    /// Fetcher that answers immediately and counts its calls.
    pub struct CountingFetcher<T> {
        respond: Respond<T>,
        calls: AtomicUsize,
    }

    impl<T> CountingFetcher<T> {
        pub fn new<F>(respond: F) -> Self
        where
            F: Fn(&Key) -> Result<T, FetchError> + Send + Sync + 'static,
        {
            Self {
                respond: Box::new(respond),
                calls: AtomicUsize::new(0),
            }
        }

        /// Fetcher that always fails with `FetchError::Failed { reason }`.
        pub fn failing(reason: impl Into<String>) -> Self {
            let reason = reason.into();
            Self::new(move |key: &Key| Err(FetchError::failed(key.clone(), reason.clone())))
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<T: Send + 'static> Fetcher<T> for CountingFetcher<T> {
        async fn fetch(&self, key: &Key) -> Result<T, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.respond)(key)
        }
    }

    /// Fetcher that blocks every call until the test releases it.
    ///
    /// Lets a test hold a fetch in flight while it races other operations
    /// against it.
    pub struct GatedFetcher<T> {
        respond: Respond<T>,
        calls: AtomicUsize,
        started: Notify,
        gate: Semaphore,
    }

    impl<T> GatedFetcher<T> {
        pub fn new<F>(respond: F) -> Self
        where
            F: Fn(&Key) -> Result<T, FetchError> + Send + Sync + 'static,
        {
            Self {
                respond: Box::new(respond),
                calls: AtomicUsize::new(0),
                started: Notify::new(),
                gate: Semaphore::new(0),
            }
        }

        /// Wait until a call has entered the fetcher.
        pub async fn wait_started(&self) {
            self.started.notified().await;
        }

        /// Let `n` blocked (or future) calls proceed.
        pub fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<T: Send + 'static> Fetcher<T> for GatedFetcher<T> {
        async fn fetch(&self, key: &Key) -> Result<T, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            match self.gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(FetchError::unavailable(key.clone())),
            }
            (self.respond)(key)
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Orca entity types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a non-empty key.
    pub fn arb_key() -> impl Strategy<Value = Key> {
        "[a-z0-9]{1,16}".prop_map(Key::new)
    }

    /// Generate a whole-second Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or(Timestamp::UNIX_EPOCH)
        })
    }

    pub fn arb_follow() -> impl Strategy<Value = Follow> {
        prop_oneof![
            Just(Follow::PublicUnfollowed),
            Just(Follow::PublicFollowing),
            Just(Follow::PrivateUnfollowed),
            Just(Follow::PrivateRequested),
            Just(Follow::PrivateFollowing),
        ]
    }

    pub fn arb_profile_kind() -> impl Strategy<Value = ProfileKind> {
        prop_oneof![
            Just(ProfileKind::Editable),
            arb_follow().prop_map(|follow| ProfileKind::Followable { follow }),
        ]
    }

    /// Generate a Profile.
    pub fn arb_profile() -> impl Strategy<Value = Profile> {
        (
            arb_key(),
            "[a-z]{1,12}",
            "[A-Za-z ]{0,30}",
            "[A-Za-z0-9 .,!]{0,120}",
            arb_profile_kind(),
            any::<u32>(),
            any::<u32>(),
        )
            .prop_map(
                |(id, handle, name, bio, kind, follower_count, following_count)| Profile {
                    account: format!("{}@mastodon.social", handle),
                    avatar_url: format!("https://mastodon.social/avatars/{}.png", id),
                    url: format!("https://mastodon.social/@{}", handle),
                    id,
                    name,
                    bio,
                    kind,
                    follower_count,
                    following_count,
                },
            )
    }

    pub fn arb_headline() -> impl Strategy<Value = Headline> {
        (
            "[A-Za-z ]{1,40}",
            prop::option::of("[A-Za-z ]{1,60}"),
            "[a-z]{1,10}",
        )
            .prop_map(|(title, subtitle, slug)| Headline {
                title,
                subtitle,
                cover_url: format!("https://example.org/{}.png", slug),
            })
    }

    pub fn arb_content() -> impl Strategy<Value = Content> {
        ("[A-Za-z0-9 <>/]{0,200}", prop::option::of(arb_headline()))
            .prop_map(|(text, headline)| Content { text, headline })
    }

    /// Generate a Post written by `author`, optionally reblogged by
    /// `reblogger`.
    pub fn arb_post_by(author: Author, reblogger: Option<Author>) -> impl Strategy<Value = Post> {
        (
            arb_key(),
            arb_content(),
            arb_timestamp(),
            any::<u32>(),
            any::<bool>(),
            any::<u32>(),
            any::<bool>(),
            any::<u32>(),
        )
            .prop_map(
                move |(
                    id,
                    content,
                    published_at,
                    comment_count,
                    is_favorite,
                    favorite_count,
                    is_reblogged,
                    reblog_count,
                )| Post {
                    url: format!("{}/{}", author.profile_url, id),
                    id,
                    author: author.clone(),
                    reblogger: reblogger.clone(),
                    content,
                    published_at,
                    comment_count,
                    is_favorite,
                    favorite_count,
                    is_reblogged,
                    reblog_count,
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::{TimeZone, Utc};

    /// The signed-in account's own profile.
    pub fn editable_profile(id: &str) -> Profile {
        Profile {
            id: Key::from(id),
            account: format!("{}@mastodon.social", id),
            avatar_url: format!("https://mastodon.social/avatars/{}.png", id),
            name: format!("Profile {}", id),
            bio: "Editable test profile".to_string(),
            kind: ProfileKind::Editable,
            follower_count: 12,
            following_count: 34,
            url: format!("https://mastodon.social/@{}", id),
        }
    }

    /// Someone else's public profile that the account follows.
    pub fn followable_profile(id: &str) -> Profile {
        Profile {
            kind: ProfileKind::Followable {
                follow: Follow::PublicFollowing,
            },
            bio: "Followable test profile".to_string(),
            ..editable_profile(id)
        }
    }

    /// Fixed publication time used by fixture posts.
    pub fn published_at() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0)
            .single()
            .unwrap_or(Timestamp::UNIX_EPOCH)
    }

    /// A post written by `author` with a link headline.
    pub fn post_by(id: &str, author: &Profile) -> Post {
        Post {
            id: Key::from(id),
            author: author.to_author(),
            reblogger: None,
            content: Content {
                text: format!("<p>Post {}</p>", id),
                headline: Some(Headline {
                    title: "Headline".to_string(),
                    subtitle: Some("Subtitle".to_string()),
                    cover_url: "https://example.org/cover.png".to_string(),
                }),
            },
            published_at: published_at(),
            comment_count: 1,
            is_favorite: false,
            favorite_count: 2,
            is_reblogged: false,
            reblog_count: 3,
            url: format!("{}/{}", author.url, id),
        }
    }

    /// `author`'s post as reblogged by `reblogger`.
    pub fn reblog(id: &str, author: &Profile, reblogger: &Profile) -> Post {
        Post {
            reblogger: Some(reblogger.to_author()),
            ..post_by(id, author)
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for Orca error variants.

    use super::*;

    /// Assert that an OrcaResult is a NotFound error for `entity_type`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &OrcaResult<T>, entity_type: EntityType) {
        match result {
            Err(OrcaError::NotFound {
                entity_type: et, ..
            }) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    /// Assert that an OrcaResult is a Fetch error.
    #[track_caller]
    pub fn assert_fetch_error<T: std::fmt::Debug>(result: &OrcaResult<T>) {
        match result {
            Err(OrcaError::Fetch(_)) => {}
            other => panic!("Expected Fetch error, got: {:?}", other),
        }
    }

    /// Assert that an OrcaResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &OrcaResult<T>) {
        match result {
            Err(OrcaError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that an OrcaResult failed because `reference_key` could not be
    /// resolved.
    #[track_caller]
    pub fn assert_unresolved_reference<T: std::fmt::Debug>(
        result: &OrcaResult<T>,
        reference_key: &Key,
    ) {
        match result {
            Err(OrcaError::Adapter(AdapterError::UnresolvedReference {
                reference_key: got,
                ..
            })) => {
                assert_eq!(got, reference_key, "Wrong key in UnresolvedReference error");
            }
            other => panic!(
                "Expected UnresolvedReference error for {}, got: {:?}",
                reference_key, other
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_counting_fetcher_counts() {
        let fetcher = fetchers::CountingFetcher::new(|key: &Key| Ok(key.to_string()));
        assert_eq!(fetcher.fetch(&Key::from("a")).await, Ok("a".to_string()));
        assert_eq!(fetcher.fetch(&Key::from("b")).await, Ok("b".to_string()));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_gated_fetcher_waits_for_release() {
        let fetcher = fetchers::GatedFetcher::new(|_: &Key| Ok(1u32));
        fetcher.release(1);
        assert_eq!(fetcher.fetch(&Key::from("a")).await, Ok(1));
        fetcher.wait_started().await;
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_fixture_profiles_differ_in_kind() {
        assert_eq!(fixtures::editable_profile("1").kind, ProfileKind::Editable);
        assert!(matches!(
            fixtures::followable_profile("1").kind,
            ProfileKind::Followable { .. }
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_keys_are_non_empty(key in generators::arb_key()) {
            prop_assert!(!key.as_str().is_empty());
        }

        #[test]
        fn prop_generated_posts_keep_their_author(
            (author, post) in generators::arb_profile().prop_flat_map(|author| {
                let strategy = generators::arb_post_by(author.to_author(), None);
                (Just(author), strategy)
            })
        ) {
            prop_assert_eq!(&post.author.id, &author.id);
            prop_assert!(!post.is_reblog());
        }
    }
}
