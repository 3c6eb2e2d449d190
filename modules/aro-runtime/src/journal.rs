//! Event journal implementations.
//!
//! Every domain event the bus dispatches is offered to a journal before its
//! handlers run. The runtime ships a no-op journal and an in-memory one for
//! tests and local inspection.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::events::Event;

/// A recorded event with its journal sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub seq: i64,
    pub recorded_at: DateTime<Utc>,
    pub event: Event,
}

#[async_trait]
pub trait EventJournal: Send + Sync {
    async fn record(&self, event: &Event) -> Result<JournalEntry>;
}

// ---------------------------------------------------------------------------
// NullJournal (default — records nothing)
// ---------------------------------------------------------------------------

pub struct NullJournal;

#[async_trait]
impl EventJournal for NullJournal {
    async fn record(&self, event: &Event) -> Result<JournalEntry> {
        Ok(JournalEntry {
            seq: 0,
            recorded_at: Utc::now(),
            event: event.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryJournal (tests — keeps everything)
// ---------------------------------------------------------------------------

/// In-memory journal with incrementing sequence numbers. Thread-safe.
pub struct MemoryJournal {
    next_seq: AtomicI64,
    entries: Mutex<Vec<JournalEntry>>,
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self {
            next_seq: AtomicI64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Every recorded entry, in recording order.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.entries().into_iter().map(|e| e.event).collect()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl EventJournal for MemoryJournal {
    async fn record(&self, event: &Event) -> Result<JournalEntry> {
        let entry = JournalEntry {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            recorded_at: Utc::now(),
            event: event.clone(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(entry)
    }
}

// ---------------------------------------------------------------------------
// Arc<J> blanket — lets tests share the journal for assertions
// ---------------------------------------------------------------------------

#[async_trait]
impl<J: EventJournal + ?Sized> EventJournal for Arc<J> {
    async fn record(&self, event: &Event) -> Result<JournalEntry> {
        (**self).record(event).await
    }
}
