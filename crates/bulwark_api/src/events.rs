//! Typed publish/subscribe between the host and extensions.
//!
//! Events are routed by key: `core:<name>` for host lifecycle signals and
//! `extension:<extension>:<name>` for messages between extensions. Payloads
//! travel as JSON, so an extension built as a separate library never shares
//! a concrete Rust type with the host.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Core event emitted once every extension has been given a chance to load.
pub const EXTENSIONS_LOADED: &str = "extensions_loaded";
/// Core event emitted after every extension has been unloaded.
pub const EXTENSIONS_UNLOADED: &str = "extensions_unloaded";

/// Anything that can travel through the [`EventSystem`].
pub trait Event: Serialize + DeserializeOwned + Send + Sync + fmt::Debug + 'static {}

impl<T> Event for T where T: Serialize + DeserializeOwned + Send + Sync + fmt::Debug + 'static {}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
}

#[derive(Debug, Default, Clone)]
pub struct EventSystemStats {
    pub total_handlers: usize,
    pub events_emitted: u64,
}

type Handler = Arc<dyn Fn(&Value) -> Result<(), EventError> + Send + Sync>;

fn core_key(event: &str) -> String {
    format!("core:{event}")
}

fn extension_key(extension: &str, event: &str) -> String {
    format!("extension:{extension}:{event}")
}

/// Routes events to the handlers registered for their key.
///
/// Handlers for one key run sequentially in registration order. A failing
/// handler is logged and does not stop the others.
#[derive(Default)]
pub struct EventSystem {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
    emitted: AtomicU64,
}

impl fmt::Debug for EventSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSystem").finish_non_exhaustive()
    }
}

impl EventSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a host lifecycle event.
    pub async fn on_core<T, F>(&self, event: &str, handler: F) -> Result<(), EventError>
    where
        T: Event,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.subscribe(core_key(event), handler).await;
        Ok(())
    }

    /// Registers a handler for an event published by an extension.
    pub async fn on_extension<T, F>(
        &self,
        extension: &str,
        event: &str,
        handler: F,
    ) -> Result<(), EventError>
    where
        T: Event,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.subscribe(extension_key(extension, event), handler).await;
        Ok(())
    }

    async fn subscribe<T, F>(&self, key: String, handler: F)
    where
        T: Event,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let erased: Handler = Arc::new(move |payload: &Value| {
            let event = T::deserialize(payload).map_err(EventError::Deserialization)?;
            handler(event)
        });
        debug!("Registered handler for {}", key);
        self.handlers.write().await.entry(key).or_default().push(erased);
    }

    pub async fn emit_core<T: Event>(&self, event: &str, payload: &T) -> Result<(), EventError> {
        self.emit(core_key(event), payload).await
    }

    pub async fn emit_extension<T: Event>(
        &self,
        extension: &str,
        event: &str,
        payload: &T,
    ) -> Result<(), EventError> {
        self.emit(extension_key(extension, event), payload).await
    }

    async fn emit<T: Event>(&self, key: String, payload: &T) -> Result<(), EventError> {
        let payload = serde_json::to_value(payload)?;
        // Handlers are cloned out so one may subscribe further handlers.
        let handlers = self.handlers.read().await.get(&key).cloned().unwrap_or_default();

        debug!("Emitting {} to {} handler(s)", key, handlers.len());
        for (index, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler(&payload) {
                error!("Handler #{} for {} failed: {}", index, key, e);
            }
        }

        self.emitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn get_stats(&self) -> EventSystemStats {
        EventSystemStats {
            total_handlers: self.handlers.read().await.values().map(Vec::len).sum(),
            events_emitted: self.emitted.load(Ordering::Relaxed),
        }
    }
}

/// Payload of `core:extensions_loaded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionsLoadedEvent {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
    pub timestamp: u64,
}

/// Payload of `core:extensions_unloaded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionsUnloadedEvent {
    pub unloaded: Vec<String>,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct Greeting {
        who: String,
    }

    #[tokio::test]
    async fn test_core_event_reaches_handlers_in_order() {
        let events = EventSystem::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            events
                .on_core(EXTENSIONS_LOADED, move |event: ExtensionsLoadedEvent| {
                    seen.lock().unwrap().push(format!("{tag}:{}", event.loaded.join(",")));
                    Ok(())
                })
                .await
                .unwrap();
        }

        events
            .emit_core(
                EXTENSIONS_LOADED,
                &ExtensionsLoadedEvent {
                    loaded: vec!["greeter".into()],
                    failed: vec![],
                    timestamp: 0,
                },
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), ["first:greeter", "second:greeter"]);
        let stats = events.get_stats().await;
        assert_eq!(stats.total_handlers, 2);
        assert_eq!(stats.events_emitted, 1);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let events = EventSystem::new();
        let calls = Arc::new(AtomicUsize::new(0));

        events
            .on_extension("greeter", "hello", |_: Greeting| {
                Err(EventError::HandlerExecution("nope".into()))
            })
            .await
            .unwrap();
        let counter = calls.clone();
        events
            .on_extension("greeter", "hello", move |event: Greeting| {
                assert_eq!(event.who, "world");
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        events
            .emit_extension("greeter", "hello", &Greeting { who: "world".into() })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mismatched_payload_is_skipped() {
        let events = EventSystem::new();
        let calls = Arc::new(AtomicUsize::new(0));

        events
            .on_core(EXTENSIONS_LOADED, |_: Greeting| Ok(()))
            .await
            .unwrap();
        let counter = calls.clone();
        events
            .on_core(EXTENSIONS_LOADED, move |_: ExtensionsLoadedEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        events
            .on_extension("greeter", "hello", |_: Greeting| Ok(()))
            .await
            .unwrap();

        events
            .emit_core(
                EXTENSIONS_LOADED,
                &ExtensionsLoadedEvent {
                    loaded: vec![],
                    failed: vec![],
                    timestamp: 1,
                },
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = events.get_stats().await;
        assert_eq!(stats.total_handlers, 3);
        assert_eq!(stats.events_emitted, 1);
    }

    #[tokio::test]
    async fn test_emit_without_handlers_is_ok() {
        let events = EventSystem::new();
        events
            .emit_core(EXTENSIONS_UNLOADED, &ExtensionsUnloadedEvent {
                unloaded: vec![],
                timestamp: 0,
            })
            .await
            .unwrap();
    }
}
