//! # hook-parser
//!
//! XML parsing for Recurly-style webhook notifications.
//!
//! A webhook body is an XML document with a single root element whose tag names
//! the event. This crate turns such a body into a [`Notification`]: the event
//! name plus a generic [`serde_json::Value`] tree mirroring the document.
//!
//! ## Usage
//!
//! ```rust
//! use hook_parser::parse_notification;
//!
//! let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
//! <canceled_subscription_notification>
//!   <account><account_code>abc</account_code></account>
//! </canceled_subscription_notification>"#;
//!
//! let notification = parse_notification(xml)?;
//! assert_eq!(notification.name(), "canceled_subscription_notification");
//! assert_eq!(notification.body()["account"]["account_code"], "abc");
//! # Ok::<(), hook_parser::ParseError>(())
//! ```

pub mod error;
pub mod notification;
pub mod tree;

// Re-export error types for convenient top-level access
pub use error::{ParseError, ParseResult};

pub use notification::{parse_notification, Notification};
pub use tree::{parse_document, ATTRIBUTES_KEY, TEXT_KEY};
