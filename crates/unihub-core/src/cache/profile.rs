//! The signed-in user's profile, kept consistent with the session.
//!
//! `ProfileCache` holds the profile in memory (published through a watch
//! channel), mirrors it in the credential store so a restart can greet the
//! user without a round-trip, and follows the session state channel: signing
//! in hydrates from the mirror or fetches, signing out evicts everything.
//! A failed fetch also evicts - showing no profile beats showing a stale or
//! wrong one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, AuthApi};
use crate::auth::store::{CredentialStore, RetentionTier, PROFILE_KEY};
use crate::auth::{SessionManager, SessionState, REMEMBER_RETENTION_DAYS};
use crate::models::{ProfileUpdate, UserProfile};

/// Persisted mirror payload. `cached_at` records when the server last
/// confirmed this profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileMirror {
    profile: UserProfile,
    cached_at: DateTime<Utc>,
}

/// Caches the signed-in user's profile in memory and in the credential
/// store, reacting to session state transitions.
///
/// Generic over [`AuthApi`] like the session manager, so tests can script
/// the server side.
pub struct ProfileCache<A = ApiClient> {
    api: Arc<A>,
    session: Arc<SessionManager<A>>,
    store: Arc<CredentialStore>,
    profile_tx: watch::Sender<Option<UserProfile>>,
    loading: AtomicBool,
}

impl<A: AuthApi> ProfileCache<A> {
    pub fn new(
        api: Arc<A>,
        session: Arc<SessionManager<A>>,
        store: Arc<CredentialStore>,
    ) -> Self {
        let (profile_tx, _) = watch::channel(None);
        Self {
            api,
            session,
            store,
            profile_tx,
            loading: AtomicBool::new(false),
        }
    }

    /// The cached profile, if one is loaded.
    pub fn user(&self) -> Option<UserProfile> {
        self.profile_tx.borrow().clone()
    }

    /// True while a fetch or update is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Subscribe to profile changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<UserProfile>> {
        self.profile_tx.subscribe()
    }

    fn set_user(&self, next: Option<UserProfile>) {
        self.profile_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Adopt the persisted mirror into memory, if a readable one exists.
    /// No network. An unreadable mirror is deleted and reported absent.
    pub fn hydrate_from_mirror(&self) -> Option<UserProfile> {
        let raw = self.store.get(PROFILE_KEY)?;
        match serde_json::from_str::<ProfileMirror>(&raw) {
            Ok(mirror) => {
                debug!(cached_at = %mirror.cached_at, "Profile restored from mirror");
                self.set_user(Some(mirror.profile.clone()));
                Some(mirror.profile)
            }
            Err(e) => {
                warn!(error = %e, "Stored profile mirror unreadable, discarding");
                self.store.delete(PROFILE_KEY);
                None
            }
        }
    }

    /// Fetch the profile from the server and cache it.
    ///
    /// Fails fast when the session is not authenticated; otherwise the call
    /// goes through the session's request pipeline, so a stale access token
    /// gets the usual refresh-and-replay. On success the profile lands in
    /// memory and in exactly one mirror entry, keeping an existing mirror's
    /// tier. Any failure evicts both memory and mirror.
    pub async fn fetch_user_profile(&self) -> Result<UserProfile, ApiError> {
        if !self.session.is_authenticated() {
            return Err(ApiError::NotAuthenticated);
        }

        self.loading.store(true, Ordering::SeqCst);
        let api = Arc::clone(&self.api);
        let result = self
            .session
            .request(move |token| {
                let api = Arc::clone(&api);
                async move { api.fetch_profile(&token).await }
            })
            .await;
        self.loading.store(false, Ordering::SeqCst);

        match result {
            Ok(profile) => {
                self.remember(&profile);
                self.set_user(Some(profile.clone()));
                Ok(profile)
            }
            Err(error) => {
                warn!(%error, "Profile fetch failed, evicting cached profile");
                self.clear_user_profile();
                Err(error)
            }
        }
    }

    /// Push profile edits to the server and re-cache the result.
    ///
    /// A rejected update surfaces per-field messages and leaves the cached
    /// profile alone - it still reflects the server's last accepted state.
    pub async fn update_profile(&self, patch: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        if !self.session.is_authenticated() {
            return Err(ApiError::NotAuthenticated);
        }

        self.loading.store(true, Ordering::SeqCst);
        let api = Arc::clone(&self.api);
        let patch = patch.clone();
        let result = self
            .session
            .request(move |token| {
                let api = Arc::clone(&api);
                let patch = patch.clone();
                async move { api.update_profile(&token, &patch).await }
            })
            .await;
        self.loading.store(false, Ordering::SeqCst);

        let profile = result?;
        info!("Profile updated");
        self.remember(&profile);
        self.set_user(Some(profile.clone()));
        Ok(profile)
    }

    /// Drop the in-memory profile and its persisted mirror. Safe to call
    /// when nothing is cached.
    pub fn clear_user_profile(&self) {
        self.set_user(None);
        self.store.delete(PROFILE_KEY);
    }

    /// Write the mirror entry, preserving an existing mirror's tier. A new
    /// mirror starts session-scoped; a long-tier mirror stays long, with its
    /// retention window restarted.
    fn remember(&self, profile: &UserProfile) {
        let retention = match self.store.tier_of(PROFILE_KEY) {
            Some(RetentionTier::Long) => Some(REMEMBER_RETENTION_DAYS),
            _ => None,
        };
        let mirror = ProfileMirror {
            profile: profile.clone(),
            cached_at: Utc::now(),
        };
        match serde_json::to_string(&mirror) {
            Ok(json) => self.store.set(PROFILE_KEY, &json, retention),
            Err(e) => warn!(error = %e, "Could not serialize profile mirror"),
        }
    }
}

impl<A: AuthApi + 'static> ProfileCache<A> {
    /// Start following the session's state channel.
    ///
    /// On a transition into the authenticated state the watcher hydrates
    /// from the mirror, or fetches when no mirror exists. Whenever it
    /// observes the session settled unauthenticated it evicts memory and
    /// mirror - also on the very first observation, so a mirror left by an
    /// earlier account cannot outlive a failed session restore. The session
    /// publishes only settled outcomes, so the watcher never reacts to a
    /// half-finished startup check.
    pub fn attach(self: Arc<Self>) -> JoinHandle<()> {
        let cache = self;
        let mut rx = cache.session.subscribe();
        tokio::spawn(async move {
            let mut was_authenticated = false;
            loop {
                let state = *rx.borrow_and_update();
                if state.is_authenticated() {
                    if !was_authenticated {
                        cache.on_signed_in().await;
                    }
                } else if state == SessionState::Unauthenticated {
                    debug!("Session unauthenticated, evicting profile");
                    cache.clear_user_profile();
                }
                was_authenticated = state.is_authenticated();
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    async fn on_signed_in(&self) {
        if self.hydrate_from_mirror().is_some() {
            return;
        }
        debug!("No profile mirror, fetching");
        if let Err(error) = self.fetch_user_profile().await {
            warn!(%error, "Could not load profile after sign-in");
        }
    }
}
