// src/scope.rs

//! Scope keys and ledger names.
//!
//! A scope is a `:`-joined path of dimension segments (`o:5`, `o:5:u:7`,
//! `t:3`). Segments may not contain the separator, so encoding is injective
//! and a key can always be split back into the values it was built from.
//! Prefix filters match on whole segments: `o:5` covers `o:5:u:7` but not
//! `o:50`.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};

/// Separator between scope segments
pub const SEPARATOR: char = ':';

/// Longest scope key the ledger will accept
pub const MAX_SCOPE_LEN: usize = 64;

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

fn push_segment(raw: &mut String, segment: &str) -> Result<()> {
    if !valid_segment(segment) {
        return Err(TallyError::InvalidScope(format!("invalid segment '{segment}'")));
    }
    if !raw.is_empty() {
        raw.push(SEPARATOR);
    }
    raw.push_str(segment);
    Ok(())
}

/// A validated, encoded scope key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeKey(String);

impl ScopeKey {
    /// Parse an already-encoded key, rejecting anything malformed.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(TallyError::InvalidScope("empty scope".to_string()));
        }
        if raw.len() > MAX_SCOPE_LEN {
            return Err(TallyError::InvalidScope(format!(
                "'{raw}' is longer than {MAX_SCOPE_LEN} bytes"
            )));
        }
        if let Some(bad) = raw.split(SEPARATOR).find(|s| !valid_segment(s)) {
            return Err(TallyError::InvalidScope(format!(
                "'{raw}' has invalid segment '{bad}'"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Encode a key from its segments.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        let mut raw = String::new();
        for segment in segments {
            push_segment(&mut raw, &segment.to_string())?;
        }
        Self::parse(&raw)
    }

    /// `o:{org}`
    pub fn org(org_id: i64) -> Self {
        Self(format!("o:{org_id}"))
    }

    /// `o:{org}:u:{user}`
    pub fn org_user(org_id: i64, user_id: i64) -> Self {
        Self(format!("o:{org_id}:u:{user_id}"))
    }

    /// `t:{team}`
    pub fn team(team_id: i64) -> Self {
        Self(format!("t:{team_id}"))
    }

    /// Append one more segment to this key.
    pub fn child<S: fmt::Display>(&self, segment: S) -> Result<Self> {
        self.join([segment])
    }

    /// Append several segments to this key.
    pub fn join<I, S>(&self, segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        let mut raw = self.0.clone();
        for segment in segments {
            push_segment(&mut raw, &segment.to_string())?;
        }
        Self::parse(&raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the key back into its segments.
    pub fn segments(&self) -> Vec<&str> {
        self.0.split(SEPARATOR).collect()
    }

    /// Value following a labelled segment, e.g. `u` in `o:5:u:7` gives `7`.
    pub fn dimension(&self, label: &str) -> Option<&str> {
        let segments = self.segments();
        segments
            .chunks(2)
            .find(|pair| pair.len() == 2 && pair[0] == label)
            .map(|pair| pair[1])
    }

    /// True when `prefix` equals this key or is a leading run of its segments.
    pub fn has_prefix(&self, prefix: &ScopeKey) -> bool {
        self.strip_prefix(prefix).is_some()
    }

    /// Remainder after a segment-aligned prefix (`""` when equal).
    pub fn strip_prefix(&self, prefix: &ScopeKey) -> Option<&str> {
        let rest = self.0.strip_prefix(prefix.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix(SEPARATOR)
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ScopeKey {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ScopeKey {
    type Error = TallyError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ScopeKey> for String {
    fn from(key: ScopeKey) -> Self {
        key.0
    }
}

/// Which scopes a query covers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScopeFilter {
    /// Every scope in the ledger
    #[default]
    All,
    /// Exactly these scopes
    Exact(BTreeSet<ScopeKey>),
    /// The prefix itself and every scope below it
    Prefix(ScopeKey),
}

impl ScopeFilter {
    pub fn exact<I: IntoIterator<Item = ScopeKey>>(scopes: I) -> Self {
        ScopeFilter::Exact(scopes.into_iter().collect())
    }

    pub fn single(scope: ScopeKey) -> Self {
        Self::exact([scope])
    }

    /// Parse a prefix filter. A trailing separator (`o:`) is accepted and
    /// means the same as `o`.
    pub fn prefix(raw: &str) -> Result<Self> {
        let trimmed = raw.strip_suffix(SEPARATOR).unwrap_or(raw);
        Ok(ScopeFilter::Prefix(ScopeKey::parse(trimmed)?))
    }

    pub fn matches(&self, scope: &ScopeKey) -> bool {
        match self {
            ScopeFilter::All => true,
            ScopeFilter::Exact(set) => set.contains(scope),
            ScopeFilter::Prefix(prefix) => scope.has_prefix(prefix),
        }
    }
}

/// Name of one logical counter within the ledger table, e.g. `tickets.reply`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerName(Cow<'static, str>);

impl LedgerName {
    /// For compile-time names; callers guarantee the name is valid.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() > MAX_SCOPE_LEN || !valid_segment(raw) {
            return Err(TallyError::InvalidLedger(raw.to_string()));
        }
        Ok(Self(Cow::Owned(raw.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LedgerName {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
