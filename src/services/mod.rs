// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Business logic services.

pub mod auth;
pub mod broadcaster;
pub mod catalog;
pub mod metrics;
pub mod retention;
pub mod session;

pub use auth::TokenService;
pub use broadcaster::Broadcaster;
pub use catalog::CatalogService;
pub use session::SessionEngine;
