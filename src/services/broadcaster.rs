// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Realtime fan-out of session events.
//!
//! Each subscribed connection owns a bounded queue. Publishing never waits:
//! a full queue loses that one event for that one subscriber, and a closed
//! queue is deregistered on the spot.

use crate::models::SessionEvent;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

type Subscribers = HashMap<u64, mpsc::Sender<String>>;

/// Session id → connection id → outbound queue.
#[derive(Clone)]
pub struct Broadcaster {
    sessions: Arc<DashMap<Uuid, Subscribers>>,
    next_connection: Arc<AtomicU64>,
    buffer: usize,
}

/// A registered connection. Dropping it deregisters the connection.
pub struct Subscription {
    pub session_id: Uuid,
    pub connection_id: u64,
    pub receiver: mpsc::Receiver<String>,
    broadcaster: Broadcaster,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster
            .unsubscribe(self.session_id, self.connection_id);
    }
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            next_connection: Arc::new(AtomicU64::new(1)),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self, session_id: Uuid) -> Subscription {
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.sessions
            .entry(session_id)
            .or_default()
            .insert(connection_id, tx);

        tracing::debug!(session_id = %session_id, connection_id, "Subscriber registered");
        Subscription {
            session_id,
            connection_id,
            receiver: rx,
            broadcaster: self.clone(),
        }
    }

    pub fn unsubscribe(&self, session_id: Uuid, connection_id: u64) {
        if let Some(mut subs) = self.sessions.get_mut(&session_id) {
            if subs.remove(&connection_id).is_some() {
                tracing::debug!(session_id = %session_id, connection_id, "Subscriber removed");
            }
        }
        self.sessions.remove_if(&session_id, |_, subs| subs.is_empty());
    }

    /// Deliver an event to every subscriber of a session.
    ///
    /// Returns the number of subscribers that accepted it.
    pub fn publish(&self, session_id: Uuid, event: &SessionEvent) -> usize {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to encode event");
                return 0;
            }
        };

        let mut delivered = 0;
        let now_empty = match self.sessions.get_mut(&session_id) {
            Some(mut subs) => {
                subs.retain(|&connection_id, tx| match tx.try_send(text.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            session_id = %session_id,
                            connection_id,
                            "Subscriber queue full, dropping event"
                        );
                        true
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(
                            session_id = %session_id,
                            connection_id,
                            "Subscriber closed, deregistering"
                        );
                        false
                    }
                });
                subs.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.sessions.remove_if(&session_id, |_, subs| subs.is_empty());
        }
        delivered
    }

    /// Deliver an event to one connection only. Returns false if it was not delivered.
    pub fn send_to(&self, session_id: Uuid, connection_id: u64, event: &SessionEvent) -> bool {
        let Ok(text) = serde_json::to_string(event) else {
            return false;
        };
        self.sessions
            .get(&session_id)
            .and_then(|subs| subs.get(&connection_id).map(|tx| tx.try_send(text).is_ok()))
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self, session_id: Uuid) -> usize {
        self.sessions
            .get(&session_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}
