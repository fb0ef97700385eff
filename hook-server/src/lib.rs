//! HTTP receiver for Recurly-style webhook notifications.
//!
//! This crate accepts XML webhook callbacks on a single path, checks their
//! basic-auth credentials, parses the body, and republishes each notification
//! to in-process subscribers.
//!
//! # Overview
//!
//! - [`RecurlyHook`]: builder that owns the configuration and the
//!   subscriptions, and starts the server with [`RecurlyHook::listen`].
//! - [`HookServer`]: handle to the running server (address, shutdown).
//! - [`EventDispatcher`]: the publish/subscribe registry. A notification whose
//!   root tag is `new_account_notification` is published under `Recurly.*`
//!   with its raw name, then under `Recurly.new_account_notification`. Every
//!   rejected request is published under `Recurly.error`.
//! - [`HookConfig`]: port, host, credentials, path, namespace and logger.
//!
//! # Request pipeline
//!
//! 1. Wrong path: 404, nothing else is inspected
//! 2. Method other than POST: 405
//! 3. Body is buffered ([`BodyAccumulator`])
//! 4. Credentials that do not match: 403 (401 with a challenge if configured)
//! 5. Body that is not a single-rooted XML document: 400
//! 6. Otherwise the notification is dispatched and 200 is returned
//!
//! Every response body is JSON of the form `{"message":"ok","result":"ok"}`.
//!
//! # Example
//!
//! ```no_run
//! use hook_server::{HookConfig, RecurlyHook, TracingLogger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hook_server::HookError> {
//!     let config = HookConfig::new()
//!         .with_credentials("user", "pass")
//!         .with_logger(TracingLogger);
//!
//!     let mut hook = RecurlyHook::new(config);
//!     hook.on("successful_payment_notification", |data| {
//!         let payment = &data["successful_payment_notification"]["transaction"];
//!         println!("payment received: {payment}");
//!     });
//!
//!     let server = hook.listen().await?;
//!     tokio::signal::ctrl_c().await.ok();
//!     server.shutdown().await
//! }
//! ```

pub mod auth;
pub mod body;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logger;
pub mod logging;
pub mod response;
mod server;

pub use auth::{CredentialChecker, Credentials};
pub use body::BodyAccumulator;
pub use config::{AuthFailureStatus, HookConfig};
pub use dispatcher::{derive_key, Delivery, EventDispatcher, Handler};
pub use error::HookError;
pub use logger::{HookLogger, NoopLogger, TracingLogger};
pub use response::{Reply, ReplyResult};
pub use server::{HookServer, RecurlyHook};

pub use hook_parser::{Notification, ParseError};
