//! # roombook: meeting-room booking client
//!
//! `roombook` is a client library and command-line tool for a meeting-room booking service. It
//! covers the room inventory, the user directory and, at its core, the booking workflow: pick a
//! time window, see which rooms are free, and submit a booking that the service accepts or
//! rejects depending on overlap with existing confirmed bookings.
//!
//! ## Architecture
//!
//! The **admission rules** live in [`policy`] as a pure function over a candidate booking and the
//! bookings already on record. Two half-open windows `[s1, e1)` and `[s2, e2)` overlap iff
//! `s1 < e2 && s2 < e1`, so back-to-back meetings are fine; cancelled bookings never conflict.
//! The same rule backs [`availability`] answers and the in-memory service.
//!
//! The **service layer** ([`api`]) is a trait over the remote REST operations with two
//! implementations: [`api::http::HttpBookingApi`] for the real service and
//! [`api::in_memory::InMemoryBookingApi`], which enforces the admission rules locally and is used
//! by tests and `--offline` runs.
//!
//! The **workflow layer** ([`service::BookingService`]) acts on behalf of one [`session::Session`]:
//! it gates each operation on the user's role, validates booking drafts ([`draft`]) before any
//! network call, caches reads for a short time ([`cache`]) and invalidates the affected resource
//! kinds after every mutation. Drafts that fail to submit are kept in a [`draft_store`] so they
//! can be fixed and resubmitted.
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and `ROOMBOOK_` environment overrides.

pub mod api;
pub mod availability;
pub mod cache;
pub mod cli;
pub mod config;
pub mod draft;
pub mod draft_store;
pub mod errors;
pub mod models;
pub mod policy;
pub mod service;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod window;

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::api::BookingApi;
use crate::api::http::HttpBookingApi;
use crate::api::in_memory::InMemoryBookingApi;
use crate::cache::MokaStore;
use crate::draft_store::{DraftStore, FileDraftStore, InMemoryDraftStore};
use crate::models::users::LoginRequest;
use crate::types::Role;

pub use config::Config;
pub use errors::{Error, Result};
pub use service::BookingService;
pub use types::{BookingId, RoomId, UserId};

const OFFLINE_EMAIL: &str = "admin@localhost";
const OFFLINE_PASSWORD: &str = "admin";

/// A signed-in client, ready to run commands.
pub struct Application {
    service: BookingService,
}

impl Application {
    /// Build the booking api from `config`, sign in and wire up the cache and draft store.
    ///
    /// With `offline` set, an in-memory service seeded from `config.offline` replaces the
    /// remote one and the configured credentials become its admin. A missing email or password
    /// falls back to `admin@localhost` or `admin` respectively.
    pub async fn new(config: Config, offline: bool) -> anyhow::Result<Self> {
        let credentials = match (&config.api.email, &config.api.password) {
            (Some(email), Some(password)) => LoginRequest {
                email: email.clone(),
                password: password.clone(),
            },
            (email, password) if offline => LoginRequest {
                email: email.clone().unwrap_or_else(|| OFFLINE_EMAIL.to_string()),
                password: password.clone().unwrap_or_else(|| OFFLINE_PASSWORD.to_string()),
            },
            _ => anyhow::bail!(
                "Credentials missing: set api.email and api.password (or ROOMBOOK_API__EMAIL / ROOMBOOK_API__PASSWORD)"
            ),
        };

        let api: Arc<dyn BookingApi> = if offline {
            let api = InMemoryBookingApi::new(config.policy.clone());
            api.add_user("Administrator", &credentials.email, &credentials.password, Role::Admin);
            for room in &config.offline.rooms {
                api.add_room(room.clone());
            }
            info!(rooms = config.offline.rooms.len(), "Using in-memory booking service");
            Arc::new(api)
        } else {
            Arc::new(HttpBookingApi::new(&config.api).context("Failed to set up booking service client")?)
        };

        let session = api.login(&credentials).await.context("Login failed")?;
        info!(user_id = session.user_id(), role = %session.role(), "Signed in");

        let drafts: Arc<dyn DraftStore> = match &config.draft_dir {
            Some(dir) => Arc::new(FileDraftStore::new(dir.clone())),
            None => Arc::new(InMemoryDraftStore::new()),
        };

        let service = BookingService::builder()
            .api(api)
            .cache(Arc::new(MokaStore::new(&config.cache)))
            .drafts(drafts)
            .session(session)
            .rules(config.drafts)
            .build();
        Ok(Self { service })
    }

    pub fn service(&self) -> &BookingService {
        &self.service
    }

    pub async fn run(&self, command: cli::Command) -> Result<()> {
        cli::run(&self.service, command).await
    }
}
