//! Queue ACL strings.
//!
//! An ACL is stored as its raw textual form: a comma-separated user list,
//! optionally followed by a space and a comma/space-delimited group list.
//! Two sentinels matter to the scheduler:
//!
//! - `"*"`: everyone is allowed,
//! - `" "`: a single space, meaning nobody. The space is deliberate: it
//!   is distinguishable from an explicitly configured empty list.

use std::fmt;

use serde::Serialize;

/// Wildcard ACL granting access to everyone.
const EVERYONE: &str = "*";

/// The "nobody" ACL. A single space, never the empty string.
const NOBODY: &str = " ";

/// An access control list in its raw textual form, with parsed views over
/// the user and group lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Acl {
    raw: String,
}

impl Acl {
    /// The ACL granting access to everyone (`"*"`).
    pub fn everyone() -> Self {
        Self {
            raw: EVERYONE.to_string(),
        }
    }

    /// The ACL granting access to nobody (the single-space sentinel).
    pub fn nobody() -> Self {
        Self {
            raw: NOBODY.to_string(),
        }
    }

    /// Build an ACL from configured text, trimming surrounding whitespace.
    pub fn from_text(text: &str) -> Self {
        Self {
            raw: text.trim().to_string(),
        }
    }

    /// The raw ACL string as the scheduler consumes it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_everyone(&self) -> bool {
        self.raw.trim() == EVERYONE
    }

    /// The comma-separated user list (everything before the first space).
    pub fn users(&self) -> Vec<&str> {
        self.first_field()
            .split(',')
            .filter(|u| !u.is_empty())
            .collect()
    }

    /// The group list (everything after the first space, comma or space
    /// delimited).
    pub fn groups(&self) -> Vec<&str> {
        match self.raw.split_once(' ') {
            Some((_, rest)) => rest
                .split(|c| c == ',' || c == ' ')
                .filter(|g| !g.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }

    fn first_field(&self) -> &str {
        self.raw.split(' ').next().unwrap_or("")
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
