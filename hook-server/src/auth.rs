//! HTTP basic-auth credential checking.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use subtle::ConstantTimeEq;

/// Username and password carried by an `Authorization: Basic ...` header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub name: String,
    pub pass: String,
}

impl Credentials {
    pub fn new(name: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pass: pass.into(),
        }
    }

    /// Parse an `Authorization` header value.
    ///
    /// The scheme is matched case-insensitively and the decoded `user:pass`
    /// string is split at the first colon, so passwords may contain colons.
    /// Returns `None` for other schemes, bad base64, or a missing colon.
    pub fn from_authorization(header: &str) -> Option<Self> {
        let (scheme, encoded) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8_lossy(&decoded);
        let (name, pass) = decoded.split_once(':')?;

        Some(Self::new(name, pass))
    }

    /// Header value a client would send for these credentials.
    pub fn to_authorization(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", self.name, self.pass)))
    }
}

/// Compares request credentials against the configured pair.
///
/// An unset or empty configured username or password rejects every request,
/// including requests that send no credentials at all.
#[derive(Clone)]
pub struct CredentialChecker {
    expected: Option<Credentials>,
}

impl CredentialChecker {
    pub fn new(username: Option<&str>, password: Option<&str>) -> Self {
        let expected = match (username, password) {
            (Some(name), Some(pass)) if !name.is_empty() && !pass.is_empty() => {
                Some(Credentials::new(name, pass))
            }
            _ => None,
        };

        Self { expected }
    }

    /// Whether credentials are configured at all.
    pub fn is_configured(&self) -> bool {
        self.expected.is_some()
    }

    /// Check the raw `Authorization` header of a request.
    ///
    /// A missing or unparseable header counts as an empty username and password.
    pub fn check(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = &self.expected else {
            return false;
        };

        let incoming = authorization
            .and_then(Credentials::from_authorization)
            .unwrap_or_default();

        let name_matches = incoming.name.as_bytes().ct_eq(expected.name.as_bytes());
        let pass_matches = incoming.pass.as_bytes().ct_eq(expected.pass.as_bytes());

        (name_matches & pass_matches).into()
    }
}

impl std::fmt::Debug for CredentialChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialChecker")
            .field("configured", &self.is_configured())
            .finish()
    }
}
