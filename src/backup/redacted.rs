//! Secret string handling for database credentials.
//!
//! `RedactedString` holds the database password. It never shows up in debug output or
//! re-serialized configuration, and `ShellCommand` uses it to mask the secret in logged
//! command lines.

use bon::Builder;
use getset::Getters;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::result;
use zeroize::Zeroize;

/// Placeholder shown instead of the secret in logs, errors and debug output
pub static REDACTED: &str = "###REDACTED###";

#[derive(Clone, Zeroize, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[builder(into)]
    inner: String,
}

impl RedactedString {
    /// Replaces every occurrence of the secret in `text` with [`REDACTED`].
    pub fn mask(&self, text: &str) -> String {
        if self.inner.is_empty() {
            text.to_string()
        } else {
            text.replace(self.inner.as_str(), REDACTED)
        }
    }
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED)
    }
}

impl Serialize for RedactedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for RedactedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(RedactedStringVisitor)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}

pub struct RedactedStringVisitor;

impl Visitor<'_> for RedactedStringVisitor {
    type Value = RedactedString;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RedactedString::builder().inner(v).build())
    }
}
