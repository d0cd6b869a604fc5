//! Comma-separated `key=value` option lists (feature gates)

use std::collections::BTreeMap;

use crate::context::is_version_gte;

fn parse_pairs(list: &str, into: &mut BTreeMap<String, String>) {
    for part in list.split(',') {
        let part = part.trim();
        let mut kv = part.split('=');
        if let (Some(key), Some(value), None) = (kv.next(), kv.next(), kv.next()) {
            into.insert(key.to_string(), value.to_string());
        }
    }
}

/// Merge `candidate` into `existing` and return the canonical list
///
/// Pairs are keyed by option name; `candidate` wins on conflict but only
/// applies when `min_version` is empty or `version` is at least
/// `min_version`. Fragments that are not exactly one `key=value` pair are
/// dropped. The result is sorted by key with no trailing separator.
pub fn combine(existing: &str, candidate: &str, min_version: &str, version: &str) -> String {
    let mut gates = BTreeMap::new();
    parse_pairs(existing, &mut gates);
    if min_version.is_empty() || is_version_gte(version, min_version) {
        parse_pairs(candidate, &mut gates);
    }
    gates
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}
