// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client-supplied idempotency keys.
//!
//! A key is accepted in one of two shapes:
//! - a hyphenated UUID (`8-4-4-4-12` hex digits, any case)
//! - a token of 16 to 255 characters from `[A-Za-z0-9_-]` that contains at
//!   least one character outside `[0-9a-fA-F-]`, so it can never be mistaken
//!   for a mangled UUID or a bare hex digest
//!
//! Parsing happens before any side effect runs; holding an [`IdempotencyKey`]
//! means the key has already been validated.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Shortest accepted token.
pub const MIN_TOKEN_LEN: usize = 16;
/// Longest accepted token.
pub const MAX_TOKEN_LEN: usize = 255;

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    ) {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    }
});
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(r"^[A-Za-z0-9_-]+$") {
    Ok(re) => re,
    Err(_) => unreachable!("static regex pattern"),
});

/// A validated idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validates `s` as an idempotency key.
    pub fn parse(s: &str) -> Result<Self> {
        if is_valid(s) {
            Ok(IdempotencyKey(s.to_string()))
        } else {
            Err(Error::InvalidIdempotencyKey(describe(s)))
        }
    }

    /// Creates a fresh random key.
    pub fn generate() -> Self {
        Self::from(Uuid::new_v4())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key has UUID shape.
    pub fn is_uuid(&self) -> bool {
        UUID_RE.is_match(&self.0)
    }
}

fn is_valid(s: &str) -> bool {
    if UUID_RE.is_match(s) {
        return true;
    }
    (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&s.len())
        && TOKEN_RE.is_match(s)
        && s.chars().any(|c| !(c.is_ascii_hexdigit() || c == '-'))
}

fn describe(s: &str) -> String {
    if s.is_empty() {
        return "key is empty".to_string();
    }
    if s.len() < MIN_TOKEN_LEN {
        return format!("'{s}' is shorter than {MIN_TOKEN_LEN} characters");
    }
    if s.len() > MAX_TOKEN_LEN {
        return format!("key is longer than {MAX_TOKEN_LEN} characters");
    }
    if !TOKEN_RE.is_match(s) {
        return format!("'{s}' contains characters outside [A-Za-z0-9_-]");
    }
    format!("'{s}' looks like hex but is not a UUID")
}

impl From<Uuid> for IdempotencyKey {
    fn from(uuid: Uuid) -> Self {
        IdempotencyKey(uuid.hyphenated().to_string())
    }
}

impl FromStr for IdempotencyKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        if is_valid(&s) {
            Ok(IdempotencyKey(s))
        } else {
            Err(Error::InvalidIdempotencyKey(describe(&s)))
        }
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;
