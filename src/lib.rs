// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout-Tracker: live workout sessions with realtime sync
//!
//! This crate provides the backend API for recording workout sessions as
//! they happen: a session state machine, per-session realtime streams,
//! calorie and personal-record bookkeeping, and a read-only exercise catalog.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{SessionRepository, TemplateStore};
use services::{Broadcaster, CatalogService, SessionEngine, TokenService};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub tokens: TokenService,
    pub catalog: Arc<CatalogService>,
    pub broadcaster: Broadcaster,
    pub sessions: Arc<SessionEngine>,
}

impl AppState {
    /// Wire the services together over the given storage and clock.
    pub fn new(
        config: Config,
        catalog: Arc<CatalogService>,
        repo: Arc<dyn SessionRepository>,
        templates: Arc<dyn TemplateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tokens = TokenService::new(
            &config.jwt_signing_key,
            config.access_token_ttl_minutes,
            config.refresh_token_ttl_days,
        );
        let broadcaster = Broadcaster::new(config.subscriber_buffer);
        let sessions = Arc::new(SessionEngine::new(
            repo,
            templates,
            catalog.clone(),
            broadcaster.clone(),
            clock,
            config.default_body_weight_kg,
        ));

        Self {
            config,
            tokens,
            catalog,
            broadcaster,
            sessions,
        }
    }
}
