//! Protocol classification for adapter and channel declarations.
//!
//! SAP spells the same transport many ways (`SOAP 1.x`, `soap`, `HCIOData`,
//! `OData V2`, ...). [`classify`] folds those into one canonical
//! [`Protocol`] using the tables in [`table`].

pub mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Attributes;

/// A normalized transport/adapter identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Protocol(String);

impl Protocol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Canonical display name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Identity key: case-insensitive, whitespace-folded.
    ///
    /// Table hits already share one spelling; this keeps free-text fallbacks
    /// such as `FooBus` and `foobus` on the same node.
    pub fn key(&self) -> String {
        table::fold(&self.0)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve zero or one protocol from a record's raw attributes.
///
/// Keys from [`table::PROTOCOL_KEYS`] are consulted in priority order; the
/// first key carrying a usable value decides. Unknown values are returned
/// trimmed as-is so uncommon adapters still surface.
pub fn classify(attributes: &Attributes) -> Option<Protocol> {
    for key in table::PROTOCOL_KEYS {
        let Some(raw) = lookup(attributes, key) else {
            continue;
        };
        let folded = table::fold(raw);
        if table::is_non_protocol(&folded) {
            continue;
        }
        if let Some(name) = table::canonical(&folded) {
            return Some(Protocol::new(name));
        }
        return Some(Protocol::new(raw.split_whitespace().collect::<Vec<_>>().join(" ")));
    }
    None
}

/// Case-insensitive attribute lookup, ignoring any namespace prefix on the key.
fn lookup<'a>(attributes: &'a Attributes, folded_key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(k, _)| {
            let local = k.rsplit(':').next().unwrap_or(k);
            local.trim().eq_ignore_ascii_case(folded_key)
        })
        .map(|(_, v)| v.as_str())
}
