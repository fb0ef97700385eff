//! In-process publish/subscribe for webhook notifications.
//!
//! This module provides the `EventDispatcher`, which maps dispatch keys to
//! ordered handler lists. Keys are namespaced: a notification whose root tag is
//! `new_account_notification` is published with its raw name under the
//! wildcard key `Recurly.*`, then under `Recurly.new_account_notification`. Failed requests are published under
//! `Recurly.error`.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use hook_parser::Notification;
use serde_json::Value;

use crate::error::HookError;
use crate::response::Reply;

/// Suffix of the key that receives every successfully parsed notification.
pub const WILDCARD_SUFFIX: &str = "*";

/// Suffix of the key that receives every failed request.
pub const ERROR_SUFFIX: &str = "error";

/// Build the dispatch key for a tag, e.g. `("Recurly", "x")` → `"Recurly.x"`.
pub fn derive_key(namespace: &str, tag: &str) -> String {
    format!("{namespace}.{tag}")
}

/// What a handler receives.
#[derive(Debug, Clone, Copy)]
pub enum Delivery<'a> {
    /// Published under a notification's own key: the root-keyed document.
    Event(&'a Value),
    /// Published under the wildcard key.
    Any {
        /// Raw event name, without the namespace
        name: &'a str,
        /// The root-keyed document
        data: &'a Value,
    },
    /// Published under the error key for every error response.
    Error {
        error: &'a HookError,
        reply: &'a Reply,
    },
}

/// A subscribed callback.
pub type Handler = Arc<dyn for<'a> Fn(Delivery<'a>) + Send + Sync>;

/// Routes published deliveries to the handlers subscribed under their key.
///
/// Handlers are registered before the server starts listening; once the
/// server runs, the dispatcher is shared read-only between requests.
#[derive(Clone)]
pub struct EventDispatcher {
    namespace: String,
    handlers: HashMap<String, Vec<Handler>>,
}

impl EventDispatcher {
    /// Create a dispatcher for a namespace such as `"Recurly"`.
    ///
    /// # Example
    ///
    /// ```
    /// use hook_server::EventDispatcher;
    ///
    /// let dispatcher = EventDispatcher::new("Recurly");
    /// assert_eq!(dispatcher.event_key("new_account_notification"), "Recurly.new_account_notification");
    /// assert_eq!(dispatcher.wildcard_key(), "Recurly.*");
    /// ```
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key for a specific event name.
    pub fn event_key(&self, name: &str) -> String {
        derive_key(&self.namespace, name)
    }

    /// Key receiving every notification.
    pub fn wildcard_key(&self) -> String {
        derive_key(&self.namespace, WILDCARD_SUFFIX)
    }

    /// Key receiving every failure.
    pub fn error_key(&self) -> String {
        derive_key(&self.namespace, ERROR_SUFFIX)
    }

    /// Register a handler under a full dispatch key.
    ///
    /// Handlers under the same key run in registration order.
    pub fn subscribe<F>(&mut self, key: impl Into<String>, handler: F)
    where
        F: Fn(Delivery<'_>) + Send + Sync + 'static,
    {
        self.handlers
            .entry(key.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Subscribe to one event by its raw name; the handler gets the document.
    ///
    /// # Example
    ///
    /// ```
    /// use hook_server::EventDispatcher;
    ///
    /// let mut dispatcher = EventDispatcher::new("Recurly");
    /// dispatcher.on("new_account_notification", |data| {
    ///     println!("account: {}", data["new_account_notification"]["account"]);
    /// });
    /// ```
    pub fn on<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let key = self.event_key(name);
        self.subscribe(key, move |delivery| {
            if let Delivery::Event(data) = delivery {
                handler(data);
            }
        });
    }

    /// Subscribe to every notification; the handler gets the raw name and document.
    pub fn on_any<F>(&mut self, handler: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let key = self.wildcard_key();
        self.subscribe(key, move |delivery| {
            if let Delivery::Any { name, data } = delivery {
                handler(name, data);
            }
        });
    }

    /// Subscribe to failures; the handler gets the error and the reply sent.
    pub fn on_error<F>(&mut self, handler: F)
    where
        F: Fn(&HookError, &Reply) + Send + Sync + 'static,
    {
        let key = self.error_key();
        self.subscribe(key, move |delivery| {
            if let Delivery::Error { error, reply } = delivery {
                handler(error, reply);
            }
        });
    }

    /// Number of handlers registered under a key.
    pub fn handler_count(&self, key: &str) -> usize {
        self.handlers.get(key).map_or(0, Vec::len)
    }

    /// Invoke every handler under `key`, in registration order.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers still
    /// run. Returns the number of handlers that completed.
    pub fn publish(&self, key: &str, delivery: Delivery<'_>) -> usize {
        let Some(handlers) = self.handlers.get(key) else {
            return 0;
        };

        let mut completed = 0;
        for (index, handler) in handlers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(delivery))) {
                Ok(()) => completed += 1,
                Err(_) => {
                    tracing::error!(key, index, "event handler panicked");
                }
            }
        }
        completed
    }

    /// Publish a notification under the wildcard key, then under its own key.
    pub fn publish_notification(&self, notification: &Notification) {
        let name = notification.name();
        let data = notification.document();

        let wildcard = self.publish(&self.wildcard_key(), Delivery::Any { name, data });
        let specific = self.publish(&self.event_key(name), Delivery::Event(data));

        tracing::debug!(event = name, specific, wildcard, "notification dispatched");
    }

    /// Publish a failure under the error key.
    pub fn publish_error(&self, error: &HookError, reply: &Reply) {
        self.publish(&self.error_key(), Delivery::Error { error, reply });
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("EventDispatcher")
            .field("namespace", &self.namespace)
            .field("keys", &keys)
            .finish()
    }
}
