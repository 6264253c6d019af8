use std::sync::Arc;
use tracing::{error, info};

/// Lifecycle notifications for one entity-collection run. All methods have
/// empty defaults so an observer overrides only what it cares about.
pub trait CollectionObserver: Send + Sync {
    fn on_collection_start(&self, _count: usize) {}
    fn on_entity_start(&self, _name: &str) {}
    fn on_entity_end(&self, _name: &str) {}
    fn on_collection_end(&self) {}
    fn on_error(&self, _entity: &str, _step: &str, _message: &str) {}
}

/// Opaque subscription token; the only way to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

/// A registry of observers delivered to synchronously, in subscription
/// order. Subscription is handle-based so removal never has to compare
/// trait-object identities.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<(ObserverHandle, Arc<dyn CollectionObserver>)>,
    next_handle: u64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn CollectionObserver>) -> ObserverHandle {
        self.next_handle += 1;
        let handle = ObserverHandle(self.next_handle);
        self.observers.push((handle, observer));
        handle
    }

    pub fn unsubscribe(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(h, _)| *h != handle);
        self.observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify_collection_start(&self, count: usize) {
        for (_, observer) in &self.observers {
            observer.on_collection_start(count);
        }
    }

    pub fn notify_entity_start(&self, name: &str) {
        for (_, observer) in &self.observers {
            observer.on_entity_start(name);
        }
    }

    pub fn notify_entity_end(&self, name: &str) {
        for (_, observer) in &self.observers {
            observer.on_entity_end(name);
        }
    }

    pub fn notify_collection_end(&self) {
        for (_, observer) in &self.observers {
            observer.on_collection_end();
        }
    }

    pub fn notify_error(&self, entity: &str, step: &str, message: &str) {
        for (_, observer) in &self.observers {
            observer.on_error(entity, step, message);
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Observer that mirrors every notification into the log.
#[derive(Debug, Default)]
pub struct LogObserver {
    pub label: &'static str,
}

impl LogObserver {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl CollectionObserver for LogObserver {
    fn on_collection_start(&self, count: usize) {
        info!("{}: processing {count} entities", self.label);
    }

    fn on_entity_start(&self, name: &str) {
        info!("{}: start {name}", self.label);
    }

    fn on_entity_end(&self, name: &str) {
        info!("{}: end {name}", self.label);
    }

    fn on_collection_end(&self) {
        info!("{}: done", self.label);
    }

    fn on_error(&self, entity: &str, step: &str, message: &str) {
        error!("{}: {entity}: step {step} failed: {message}", self.label);
    }
}
