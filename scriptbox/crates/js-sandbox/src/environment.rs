//! Environment model — ordered key/value snapshots
//!
//! A snapshot is an append-ordered `Vec<EnvEntry>`; keys are not unique
//! at rest. Lookups resolve last-write-wins, so the most recent write
//! shadows earlier entries. All operations return a new snapshot and
//! leave the input untouched.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::protocol::EnvEntry;

lazy_static! {
    /// `<<name>>` placeholder; the name itself may not contain brackets.
    static ref PLACEHOLDER: Regex = Regex::new(r"<<([^<>]+)>>").unwrap();
}

/// Resolve `key` against the snapshot. Later entries shadow earlier
/// ones with the same key.
pub fn resolve<'a>(entries: &'a [EnvEntry], key: &str) -> Option<&'a str> {
    entries
        .iter()
        .rev()
        .find(|e| e.key == key)
        .map(|e| e.value.as_str())
}

/// Append an entry for `key`, shadowing any earlier entry on lookup.
pub fn set(entries: &[EnvEntry], key: &str, value: &str) -> Vec<EnvEntry> {
    let mut next = entries.to_vec();
    next.push(EnvEntry::new(key, value));
    next
}

/// Remove every entry with `key`.
pub fn unset(entries: &[EnvEntry], key: &str) -> Vec<EnvEntry> {
    entries.iter().filter(|e| e.key != key).cloned().collect()
}

/// Replace `<<name>>` placeholders in `text` with their snapshot
/// values, one level deep. Unknown names are left verbatim, and values
/// containing further placeholders are not expanded again.
pub fn resolve_placeholders(entries: &[EnvEntry], text: &str) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            match resolve(entries, &caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
