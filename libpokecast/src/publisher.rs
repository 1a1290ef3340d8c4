//! Publish orchestration
//!
//! One call to [`Publisher::publish`] picks an unpublished candidate, builds
//! its post, publishes it, and only then records it in history. Every step
//! is awaited in turn; nothing runs concurrently.
//!
//! Failure policy:
//! - history lookups that fail are logged and treated as "not published"
//! - content, composition, and protocol failures end the run; no other
//!   candidate is tried
//! - a history write that fails after a successful post is logged and the
//!   run still succeeds
//! - a session the PDS rejects is refreshed (or, failing that, replaced by a
//!   new login) and the upload and post are retried once; a session still
//!   rejected after that is dropped so the next run logs in again

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::bluesky::{BlueskyClient, CreatedRecord, Credentials, Session};
use crate::chart::{chart_alt_text, render_stats_chart};
use crate::compose::{compose, sprite_alt_text, ComposedPost, PendingImage};
use crate::config::Config;
use crate::error::{ConfigError, PokecastError, Result};
use crate::history::{open_history, HistoryStore};
use crate::media::MediaClient;
use crate::pokeapi::PokeApiClient;
use crate::types::CandidateId;

/// Source of candidate draws
///
/// Each call returns an id uniformly distributed over `[1, universe]`.
pub trait CandidateSource: Send {
    fn draw(&mut self, universe: u32) -> CandidateId;
}

/// Uniform random draws from a `StdRng`
pub struct RandomCandidates {
    rng: StdRng,
}

impl RandomCandidates {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible draws, for tests and dry runs
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomCandidates {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateSource for RandomCandidates {
    fn draw(&mut self, universe: u32) -> CandidateId {
        CandidateId::new(self.rng.gen_range(1..=universe.max(1)))
    }
}

/// Knobs that shape a run
#[derive(Debug, Clone)]
pub struct PublisherOptions {
    /// Catalog size N; candidates come from `[1, N]`
    pub universe: u32,
    /// Consecutive collisions tolerated before sweeping the catalog
    pub max_random_draws: u32,
    pub link_template: Option<String>,
    pub stats_chart: bool,
}

impl PublisherOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            universe: config.catalog.size,
            max_random_draws: config.catalog.max_random_draws,
            link_template: config.post.link_template.clone(),
            stats_chart: config.post.stats_chart,
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub id: CandidateId,
    pub uri: String,
    pub cid: String,
    /// False when the post went out but the history write failed
    pub history_recorded: bool,
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "successfully published pokemon #{}", self.id)
    }
}

pub struct Publisher {
    history: Box<dyn HistoryStore>,
    pokeapi: PokeApiClient,
    media: MediaClient,
    bluesky: BlueskyClient,
    credentials: Credentials,
    options: PublisherOptions,
    candidates: Box<dyn CandidateSource>,
    session: Option<Session>,
}

impl Publisher {
    pub fn new(
        history: Box<dyn HistoryStore>,
        pokeapi: PokeApiClient,
        media: MediaClient,
        bluesky: BlueskyClient,
        credentials: Credentials,
        options: PublisherOptions,
    ) -> Self {
        Self {
            history,
            pokeapi,
            media,
            bluesky,
            credentials,
            options,
            candidates: Box::new(RandomCandidates::new()),
            session: None,
        }
    }

    /// Replace the random draw source
    pub fn with_candidates(mut self, candidates: Box<dyn CandidateSource>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Build a publisher from validated configuration
    ///
    /// Opens the configured history backend and shares one HTTP connection
    /// pool between all clients.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if credentials are missing, or a history error if
    /// the backend cannot be opened.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let options = PublisherOptions::from_config(&config);
        let history = open_history(&config.history).await?;

        let Config {
            pokeapi, bluesky, ..
        } = config;
        let password = bluesky.app_password.ok_or_else(|| {
            ConfigError::MissingField(format!(
                "bluesky.app_password (or {})",
                crate::config::PASSWORD_ENV
            ))
        })?;

        let http = reqwest::Client::new();
        Ok(Self::new(
            history,
            PokeApiClient::with_client(http.clone(), pokeapi.base_url),
            MediaClient::with_client(http.clone()),
            BlueskyClient::with_client(http, bluesky.service),
            Credentials::new(bluesky.handle, password),
            options,
        ))
    }

    /// The authenticated session, once one has been created
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn history(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    /// Publish one unpublished candidate
    ///
    /// # Errors
    ///
    /// Returns `PokecastError::Exhausted` if every id is already recorded,
    /// or the first content, composition, or protocol error hit while
    /// publishing the chosen candidate.
    pub async fn publish(&mut self) -> Result<PublishOutcome> {
        let id = self.select_candidate().await?;
        info!(%id, "Selected candidate");

        let created = self.publish_candidate(id).await.map_err(|e| {
            error!(%id, error = %e, "Failed to publish candidate");
            e
        })?;
        info!(%id, uri = %created.uri, "Post created");

        let history_recorded = match self.history.record(id).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    %id,
                    backend = self.history.name(),
                    error = %e,
                    "Failed to save the published id to history; it may be published again"
                );
                false
            }
        };

        Ok(PublishOutcome {
            id,
            uri: created.uri,
            cid: created.cid,
            history_recorded,
        })
    }

    /// Draw until an unpublished id turns up
    ///
    /// After `max_random_draws` consecutive collisions the whole catalog is
    /// swept once from a random offset, so a nearly full history still
    /// terminates.
    async fn select_candidate(&mut self) -> Result<CandidateId> {
        let universe = self.options.universe;
        if universe == 0 {
            return Err(PokecastError::InvalidInput(
                "catalog size must be at least 1".to_string(),
            ));
        }

        for attempt in 1..=self.options.max_random_draws {
            let id = self.candidates.draw(universe);
            if !self.is_published(id).await {
                return Ok(id);
            }
            debug!(%id, attempt, "Already published, drawing again");
        }

        warn!(
            draws = self.options.max_random_draws,
            universe, "Random draws kept colliding; sweeping the catalog"
        );
        let start = self.candidates.draw(universe).get();
        for offset in 0..universe {
            let id = CandidateId::new(sweep_id(start, offset, universe));
            if !self.is_published(id).await {
                return Ok(id);
            }
        }

        Err(PokecastError::Exhausted { universe })
    }

    async fn is_published(&self, id: CandidateId) -> bool {
        match self.history.exists(id).await {
            Ok(published) => published,
            Err(e) => {
                warn!(
                    %id,
                    backend = self.history.name(),
                    error = %e,
                    "Failed to check history; may be double-published"
                );
                false
            }
        }
    }

    async fn publish_candidate(&mut self, id: CandidateId) -> Result<CreatedRecord> {
        let species = self.pokeapi.fetch_species(id).await?;
        let flavor_text = self.pokeapi.fetch_flavor_text(id).await?;

        let mut images = Vec::new();
        match &species.sprite_url {
            Some(url) => {
                let sprite = self.media.fetch_image(url).await?;
                sprite.ensure_within_limit()?;
                images.push(PendingImage::new(sprite_alt_text(&species.name), sprite));
            }
            None => warn!(%id, "Species has no official artwork; posting without it"),
        }
        if self.options.stats_chart {
            if let Some(chart) = render_stats_chart(&species)? {
                images.push(PendingImage::new(chart_alt_text(&species), chart));
            }
        }

        let post = compose(
            id,
            &species,
            &flavor_text,
            self.options.link_template.as_deref(),
            images,
        )?;

        match self.send_post(&post).await {
            Err(e) if e.is_authentication() && self.session.is_some() => {
                warn!(%id, error = %e, "Bluesky rejected the session; renewing it");
                self.renew_session().await?;

                let retried = self.send_post(&post).await;
                if matches!(&retried, Err(e) if e.is_authentication()) {
                    self.session = None;
                }
                retried
            }
            other => other,
        }
    }

    /// Upload the post's images and create the record under the current
    /// session, logging in first if there is none
    async fn send_post(&mut self, post: &ComposedPost) -> Result<CreatedRecord> {
        let session = self
            .bluesky
            .ensure_session(&mut self.session, &self.credentials)
            .await?;

        let mut blob_refs = Vec::with_capacity(post.images.len());
        for image in &post.images {
            blob_refs.push(self.bluesky.upload_blob(session, &image.blob).await?);
        }

        let record = post.to_record(&blob_refs, Utc::now());
        self.bluesky.create_post(session, &record).await
    }

    /// Swap the held session for a refreshed one
    ///
    /// When the refresh token is rejected too the slot is left empty, so the
    /// next `send_post` performs a fresh login.
    async fn renew_session(&mut self) -> Result<()> {
        let Some(stale) = self.session.take() else {
            return Ok(());
        };

        match self.bluesky.refresh_session(&stale).await {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(e) if e.is_authentication() => {
                debug!(error = %e, "Refresh token rejected; logging in again");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// The `offset`-th id of a wrap-around sweep over `[1, universe]` that
/// begins at `start`
fn sweep_id(start: u32, offset: u32, universe: u32) -> u32 {
    let zero_based = (u64::from(start.max(1)) - 1 + u64::from(offset)) % u64::from(universe);
    zero_based as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;
    use crate::history::object::tests::UnreachableHead;
    use crate::history::ObjectHistory;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::collections::{HashSet, VecDeque};
    use std::sync::{Arc, Mutex};

    struct Scripted(VecDeque<u32>);

    impl CandidateSource for Scripted {
        fn draw(&mut self, _universe: u32) -> CandidateId {
            CandidateId::new(self.0.pop_front().unwrap())
        }
    }

    #[derive(Default)]
    struct MemoryHistory {
        published: Mutex<HashSet<CandidateId>>,
        failing_lookups: HashSet<CandidateId>,
    }

    impl MemoryHistory {
        fn with(ids: &[u32]) -> Self {
            Self {
                published: Mutex::new(ids.iter().copied().map(CandidateId::new).collect()),
                failing_lookups: HashSet::new(),
            }
        }
    }

    #[async_trait]
    impl HistoryStore for MemoryHistory {
        async fn exists(&self, id: CandidateId) -> std::result::Result<bool, HistoryError> {
            if self.failing_lookups.contains(&id) {
                return Err(HistoryError::Lookup {
                    backend: "memory".into(),
                    id,
                    reason: "timeout".into(),
                });
            }
            Ok(self.published.lock().unwrap().contains(&id))
        }

        async fn record(&self, id: CandidateId) -> std::result::Result<(), HistoryError> {
            self.published.lock().unwrap().insert(id);
            Ok(())
        }

        fn name(&self) -> &str {
            "memory"
        }
    }

    fn publisher(
        history: impl HistoryStore + 'static,
        draws: &[u32],
        universe: u32,
        max_draws: u32,
    ) -> Publisher {
        Publisher::new(
            Box::new(history),
            PokeApiClient::new("http://127.0.0.1:9"),
            MediaClient::new(),
            BlueskyClient::new("http://127.0.0.1:9"),
            Credentials::new("pokecast.example", SecretString::from("pw")),
            PublisherOptions {
                universe,
                max_random_draws: max_draws,
                link_template: None,
                stats_chart: false,
            },
        )
        .with_candidates(Box::new(Scripted(draws.iter().copied().collect())))
    }

    #[tokio::test]
    async fn test_selection_skips_published_ids() {
        let mut publisher = publisher(MemoryHistory::with(&[1, 2, 3]), &[2, 2, 1, 7], 1025, 64);
        assert_eq!(publisher.select_candidate().await.unwrap(), CandidateId::new(7));
    }

    #[tokio::test]
    async fn test_lookup_error_assumes_unpublished() {
        let mut history = MemoryHistory::with(&[5]);
        history.failing_lookups.insert(CandidateId::new(5));

        let mut publisher = publisher(history, &[5], 10, 64);
        assert_eq!(publisher.select_candidate().await.unwrap(), CandidateId::new(5));
    }

    #[tokio::test]
    async fn test_unreachable_bucket_assumes_unpublished() {
        let history = ObjectHistory::new(Arc::new(UnreachableHead::default()), "gcs");

        let mut publisher = publisher(history, &[9], 151, 64);
        assert_eq!(publisher.select_candidate().await.unwrap(), CandidateId::new(9));
    }

    #[tokio::test]
    async fn test_sweep_after_draw_cap() {
        // Only 4 is free; random draws keep hitting 1, then the sweep starts at 2
        let mut publisher = publisher(MemoryHistory::with(&[1, 2, 3, 5]), &[1, 1, 1, 2], 5, 3);
        assert_eq!(publisher.select_candidate().await.unwrap(), CandidateId::new(4));
    }

    #[tokio::test]
    async fn test_sweep_wraps_around() {
        let mut publisher = publisher(MemoryHistory::with(&[2, 3, 4, 5]), &[4], 5, 0);
        assert_eq!(publisher.select_candidate().await.unwrap(), CandidateId::new(1));
    }

    #[tokio::test]
    async fn test_full_history_is_exhausted() {
        let mut publisher = publisher(MemoryHistory::with(&[1, 2, 3]), &[1, 2, 3, 1], 3, 3);
        match publisher.select_candidate().await {
            Err(PokecastError::Exhausted { universe }) => assert_eq!(universe, 3),
            other => panic!("Expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_universe_rejected() {
        let mut publisher = publisher(MemoryHistory::default(), &[], 0, 3);
        assert!(matches!(
            publisher.select_candidate().await,
            Err(PokecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_sweep_id_wraps() {
        let ids: Vec<u32> = (0..5).map(|offset| sweep_id(4, offset, 5)).collect();
        assert_eq!(ids, vec![4, 5, 1, 2, 3]);
        assert_eq!(sweep_id(u32::MAX, 1, u32::MAX), 1);
    }

    #[test]
    fn test_random_draws_stay_in_range() {
        let mut source = RandomCandidates::seeded(7);
        for _ in 0..1000 {
            let id = source.draw(151).get();
            assert!((1..=151).contains(&id));
        }
        assert_eq!(source.draw(1), CandidateId::new(1));
    }

    #[test]
    fn test_outcome_display() {
        let outcome = PublishOutcome {
            id: CandidateId::new(132),
            uri: "at://did/app.bsky.feed.post/1".into(),
            cid: "bafy".into(),
            history_recorded: true,
        };
        assert_eq!(outcome.to_string(), "successfully published pokemon #132");
    }
}
