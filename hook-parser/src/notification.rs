//! Webhook notification extraction.
//!
//! A notification's event name is the tag of the document's root element, and
//! its data is the whole document keyed by that tag.

use serde_json::{Map, Value};

use crate::error::{ParseError, ParseResult};
use crate::tree;

/// A parsed webhook notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    name: String,
    document: Value,
}

impl Notification {
    /// Parse an XML webhook body.
    ///
    /// # Example
    ///
    /// ```
    /// use hook_parser::Notification;
    ///
    /// let xml = "<new_account_notification><account><account_code>1</account_code></account></new_account_notification>";
    /// let notification = Notification::from_xml(xml).unwrap();
    ///
    /// assert_eq!(notification.name(), "new_account_notification");
    /// assert_eq!(notification.lookup("account.account_code").unwrap(), "1");
    /// ```
    pub fn from_xml(xml: &str) -> ParseResult<Self> {
        let (name, root) = tree::parse_document(xml)?;
        if name.is_empty() {
            return Err(ParseError::MissingRootElement);
        }

        let mut document = Map::new();
        document.insert(name.clone(), root);

        Ok(Self {
            name,
            document: Value::Object(document),
        })
    }

    /// Root tag name, e.g. `new_account_notification`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full document, keyed by the root tag.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// The root element's value.
    pub fn body(&self) -> &Value {
        &self.document[self.name.as_str()]
    }

    /// Look up a dot-separated path below the root element.
    ///
    /// Numeric segments index into arrays produced by repeated elements.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self.body(), |value, segment| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// Split into event name and document.
    pub fn into_parts(self) -> (String, Value) {
        (self.name, self.document)
    }
}

/// Parse an XML webhook body into a [`Notification`].
pub fn parse_notification(xml: &str) -> ParseResult<Notification> {
    Notification::from_xml(xml)
}
