//! The event bus.
//!
//! Subscriptions pair an event type with a state-guard set and a handler
//! feature set. Dispatch is breadth-first: the root emission is routed,
//! whatever its handlers emit is queued behind it, and so on until the queue
//! settles or the cascade limit is reached.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::events::{Emission, Event};
use crate::guard::{GuardParseError, StateGuardSet};
use crate::journal::{EventJournal, NullJournal};

/// Default number of derivation levels followed from a root emission.
pub const DEFAULT_MAX_CASCADE: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub event_type: String,
    pub guards: StateGuardSet,
    pub feature_set: String,
}

/// Runs the handlers interested in one emission.
///
/// Returns every emission those handlers produced, including failure events.
#[async_trait]
pub trait EmissionRouter: Send + Sync {
    async fn route(&self, emission: &Emission, bus: &EventBus) -> Vec<Emission>;
}

/// Outcome of a dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Emissions routed, root included.
    pub dispatched: usize,
    /// Emissions dropped for exceeding the cascade limit.
    pub dropped: usize,
}

pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    journal: Arc<dyn EventJournal>,
    max_cascade: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Arc::new(NullJournal), DEFAULT_MAX_CASCADE)
    }
}

impl EventBus {
    pub fn new(journal: Arc<dyn EventJournal>, max_cascade: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            journal,
            max_cascade,
        }
    }

    /// Subscribe `feature_set` to `event_type`, filtered by a guard
    /// expression such as `status:paid,shipped;tier:gold`. An empty
    /// expression matches every event of the type.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        guard: &str,
        feature_set: impl Into<String>,
    ) -> Result<(), GuardParseError> {
        let guards = StateGuardSet::parse(guard)?;
        self.add(Subscription {
            event_type: event_type.into(),
            guards,
            feature_set: feature_set.into(),
        });
        Ok(())
    }

    pub fn add(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(subscription);
    }

    /// Subscriptions for the event's type whose guards accept its payload.
    pub fn subscribers(&self, event: &Event) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.event_type == event.event_type && s.guards.matches(&event.payload))
            .cloned()
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn max_cascade(&self) -> usize {
        self.max_cascade
    }

    /// Route `root` and everything it causes.
    pub async fn dispatch<R>(&self, root: Emission, router: &R) -> DispatchReport
    where
        R: EmissionRouter + ?Sized,
    {
        let mut report = DispatchReport::default();
        let mut queue: VecDeque<(Emission, usize)> = VecDeque::new();
        queue.push_back((root, 0));

        while let Some((emission, depth)) = queue.pop_front() {
            if depth > self.max_cascade {
                warn!(
                    kind = emission.kind(),
                    depth,
                    limit = self.max_cascade,
                    "Cascade limit reached, dropping emission"
                );
                report.dropped += 1;
                continue;
            }

            if let Emission::Event(event) = &emission {
                if let Err(e) = self.journal.record(event).await {
                    warn!(event_type = %event.event_type, error = %e, "Failed to journal event");
                }
                debug!(event_type = %event.event_type, depth, "Dispatching event");
            }

            report.dispatched += 1;
            let parent = emission.id();
            for child in router.route(&emission, self).await {
                queue.push_back((child.caused_by(parent), depth + 1));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::journal::MemoryJournal;
    use crate::value::Value;
    use serde_json::json;

    /// Records which subscribers ran and re-emits `Ping` forever.
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmissionRouter for Recorder {
        async fn route(&self, emission: &Emission, bus: &EventBus) -> Vec<Emission> {
            let Emission::Event(event) = emission else {
                return Vec::new();
            };
            let mut seen = self.seen.lock().unwrap();
            for sub in bus.subscribers(event) {
                seen.push(sub.feature_set);
            }
            if event.event_type == "Ping" {
                vec![Emission::Event(Event::new("Ping", Value::Null))]
            } else {
                Vec::new()
            }
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            seen: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn guarded_subscriptions_filter_payloads() {
        let bus = EventBus::default();
        bus.subscribe("OrderUpdated", "status:paid,shipped", "Notify Shipping")
            .unwrap();
        bus.subscribe("OrderUpdated", "", "Audit").unwrap();

        let shipped = Event::new("OrderUpdated", Value::from(json!({"status": "SHIPPED"})));
        let draft = Event::new("OrderUpdated", Value::from(json!({"status": "draft"})));
        let other = Event::new("OrderPlaced", Value::from(json!({"status": "paid"})));

        let names = |e: &Event| -> Vec<String> {
            let mut n: Vec<String> = bus
                .subscribers(e)
                .into_iter()
                .map(|s| s.feature_set)
                .collect();
            n.sort();
            n
        };
        assert_eq!(names(&shipped), vec!["Audit", "Notify Shipping"]);
        assert_eq!(names(&draft), vec!["Audit"]);
        assert!(names(&other).is_empty());
    }

    #[test]
    fn bad_guard_is_rejected() {
        let bus = EventBus::default();
        assert!(bus.subscribe("E", "status", "H").is_err());
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn cascades_stop_at_the_limit() {
        let journal = Arc::new(MemoryJournal::new());
        let bus = EventBus::new(journal.clone(), 3);
        bus.subscribe("Ping", "", "Pong").unwrap();

        let report = bus
            .dispatch(Emission::Event(Event::new("Ping", Value::Null)), &recorder())
            .await;

        assert_eq!(report.dispatched, 4);
        assert_eq!(report.dropped, 1);

        let events = journal.events();
        assert_eq!(events.len(), 4);
        for pair in events.windows(2) {
            assert_eq!(pair[1].caused_by, Some(pair[0].id));
        }
    }
}
