use crate::{Error, Result};
use core::{fmt, str::FromStr};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Longest scope key the stores accept, in bytes.
pub const MAX_SCOPE_KEY_LEN: usize = 255;

/// Separator placed between scope key tokens.
pub const SCOPE_KEY_SEPARATOR: char = ':';

/// Opaque identifier of a tenant (an organization).
///
/// Leading and trailing whitespace is stripped; an empty identifier is
/// rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid("tenant id must not be empty"));
        }
        if trimmed.len() == id.len() {
            Ok(Self(id))
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Deterministic identifier of one logical counter inside a tenant.
///
/// Keys produced by [`ScopeKey::from_tokens`] escape the separator inside each
/// token, so two different token lists never encode to the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// Wraps a caller-provided key.
    ///
    /// The key must be non-empty and at most [`MAX_SCOPE_KEY_LEN`] bytes. It is
    /// taken verbatim; the caller is responsible for keeping it stable for a
    /// given logical sequence.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::invalid("scope key must not be empty"));
        }
        if key.len() > MAX_SCOPE_KEY_LEN {
            return Err(Error::invalid(format!(
                "scope key is {} bytes, the limit is {MAX_SCOPE_KEY_LEN}",
                key.len()
            )));
        }
        Ok(Self(key))
    }

    /// Joins `tokens` with [`SCOPE_KEY_SEPARATOR`], backslash-escaping any
    /// separator or backslash found inside a token.
    pub fn from_tokens<I, T>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut key = String::new();
        for (i, token) in tokens.into_iter().enumerate() {
            if i > 0 {
                key.push(SCOPE_KEY_SEPARATOR);
            }
            for c in token.as_ref().chars() {
                if c == SCOPE_KEY_SEPARATOR || c == '\\' {
                    key.push('\\');
                }
                key.push(c);
            }
        }
        Self::new(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = Error;

            fn try_from(s: String) -> Result<Self> {
                Self::new(s)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }
    };
}

string_newtype!(TenantId);
string_newtype!(ScopeKey);
