// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod catalog;
pub mod events;
pub mod record;
pub mod session;
pub mod template;
pub mod views;

pub use catalog::{CalorieBracket, CatalogActivity};
pub use events::{ClientMessage, SessionEvent};
pub use record::{ActivityRecord, RecordObservation};
pub use session::{ActivitySet, Session, SessionActivity, SessionSnapshot, SessionStatus, SetType};
pub use template::{TemplateActivity, TemplateSet, WorkoutTemplate};
