//! Domain value objects: Fqn, ElementKind, ContentHash, strategies.
//!
//! # Design
//!
//! These are pure value types with equality-by-value and no identity. They
//! define string representations and `FromStr` parsers so the CLI and the
//! configuration layer can round-trip them through text.

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

// ── Fqn ──────────────────────────────────────────────────────────────────────

/// Fully qualified name of an element or transformer.
///
/// Ordering is plain byte-wise string ordering; every "sorted by FQN"
/// guarantee in the pipeline relies on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fqn(String);

impl Fqn {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path-like segment, e.g. `Container` for
    /// `elements.kiln.dev/core/v0.Container`.
    pub fn short_name(&self) -> &str {
        self.0
            .rsplit(['.', '/'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(self.0.as_str())
    }
}

impl fmt::Display for Fqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fqn {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Fqn {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Fqn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Fqn {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ── ElementKind ──────────────────────────────────────────────────────────────

/// The closed set of element kinds.
///
/// Only [`ElementKind::Primitive`] and [`ElementKind::Modifier`] survive
/// flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Primitive,
    Modifier,
    Composite,
}

impl ElementKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::Modifier => "modifier",
            Self::Composite => "composite",
        }
    }

    /// Whether elements of this kind may appear in a flattened component.
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Primitive | Self::Modifier)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primitive" => Ok(Self::Primitive),
            "modifier" => Ok(Self::Modifier),
            "composite" => Ok(Self::Composite),
            other => Err(DomainError::UnknownElementKind {
                kind: other.to_owned(),
            }),
        }
    }
}

// ── ContentHash ──────────────────────────────────────────────────────────────

/// Full SHA-256 digest identifying element content.
///
/// Identity comparisons always use all 32 bytes; [`ContentHash::short`] is
/// for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub const SHORT_LEN: usize = 16;

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 16 hex characters of the digest.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..Self::SHORT_LEN / 2])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Incremental SHA-256 over an ordered list of parts.
///
/// Every part is followed by a NUL separator so `("ab", "c")` and
/// `("a", "bc")` never collide.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    digest: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.digest.update(bytes.as_ref());
        self.digest.update([0u8]);
        self
    }

    pub fn parts<I, B>(self, parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        parts.into_iter().fold(self, |hasher, p| hasher.part(p))
    }

    pub fn finish(self) -> ContentHash {
        ContentHash(self.digest.finalize().into())
    }
}

// ── MatchStrategy ────────────────────────────────────────────────────────────

/// How the matcher picks among candidate transformers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Every candidate is selected.
    All,
    /// Only candidates not dominated by a more specific one.
    #[default]
    Best,
}

impl MatchStrategy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Best => "best",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "best" => Ok(Self::Best),
            other => Err(DomainError::InvalidOption {
                option: "strategy",
                value: other.to_owned(),
                expected: "all, best",
            }),
        }
    }
}

// ── CollisionPolicy ──────────────────────────────────────────────────────────

/// What the flattener does when two expansions produce the same FQN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// The later expansion replaces the earlier one.
    #[default]
    LastWriteWins,
    /// Differing content hashes are a conflict.
    RequireIdentical,
}

impl CollisionPolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LastWriteWins => "last-write-wins",
            Self::RequireIdentical => "require-identical",
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollisionPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "last-write-wins" | "last" => Ok(Self::LastWriteWins),
            "require-identical" | "identical" => Ok(Self::RequireIdentical),
            other => Err(DomainError::InvalidOption {
                option: "collision policy",
                value: other.to_owned(),
                expected: "last-write-wins, require-identical",
            }),
        }
    }
}
