// src/group.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::heuristics::{ExtractedIdentity, document_prefix, is_customs_only_name};
use crate::naming::{UNCLASSIFIED, UNCONFIRMED};

/// Importer value shown when group members name different importers.
pub const MULTIPLE_IMPORTERS: &str = "복수";

/// Consensus metadata for one merge group. Always fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGroupMetadata {
    pub customs: String,
    pub bl: String,
}

impl ResolvedGroupMetadata {
    pub fn has_customs(&self) -> bool {
        self.customs != UNCLASSIFIED
    }

    pub fn has_bl(&self) -> bool {
        self.bl != UNCONFIRMED
    }
}

/// The single distinct value, if there is exactly one.
fn consensus<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Option<&'a str> {
    let distinct: BTreeSet<&str> = values.flatten().filter(|v| !v.is_empty()).collect();
    if distinct.len() == 1 {
        distinct.into_iter().next()
    } else {
        None
    }
}

/// Reduce per-file identities to one customs value and one BL value.
///
/// A field falls back to its sentinel when no member has it or members disagree.
pub fn resolve_group(members: &[ExtractedIdentity]) -> ResolvedGroupMetadata {
    let customs = consensus(members.iter().map(|m| m.customs_number.as_deref()));
    let bl = consensus(members.iter().map(|m| m.bl_code.as_deref()));
    ResolvedGroupMetadata {
        customs: customs.unwrap_or(UNCLASSIFIED).to_string(),
        bl: bl.unwrap_or(UNCONFIRMED).to_string(),
    }
}

/// `None` when nobody names an importer, the name when all agree, otherwise `"복수"`.
pub fn resolve_importer<'a>(importers: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let distinct: BTreeSet<&str> = importers
        .into_iter()
        .flatten()
        .filter(|v| !v.is_empty())
        .collect();
    match distinct.len() {
        0 => None,
        1 => distinct.into_iter().next().map(str::to_string),
        _ => Some(MULTIPLE_IMPORTERS.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Group-key assignment
// ---------------------------------------------------------------------------

/// BL code -> customs number, learned from files that carry both.
/// A BL seen with two different customs numbers maps to `None`.
fn bl_customs_map(identities: &[ExtractedIdentity]) -> HashMap<&str, Option<&str>> {
    let mut map: HashMap<&str, Option<&str>> = HashMap::new();
    for id in identities {
        let (Some(customs), Some(bl)) = (id.customs_number.as_deref(), id.bl_code.as_deref())
        else {
            continue;
        };
        map.entry(bl)
            .and_modify(|known| {
                if *known != Some(customs) {
                    *known = None;
                }
            })
            .or_insert(Some(customs));
    }
    map
}

/// Group key for every file, in input order.
///
/// Own customs number first, then the customs number its BL code is known to
/// belong to, otherwise the unclassified sentinel.
pub fn assign_group_keys(identities: &[ExtractedIdentity]) -> Vec<String> {
    let bl_map = bl_customs_map(identities);
    identities
        .iter()
        .map(|id| {
            if let Some(customs) = id.customs_number.as_deref() {
                return customs.to_string();
            }
            id.bl_code
                .as_deref()
                .and_then(|bl| bl_map.get(bl).copied().flatten())
                .unwrap_or(UNCLASSIFIED)
                .to_string()
        })
        .collect()
}

/// Indices grouped by key, keys sorted with the sentinel group last.
pub fn group_indices(keys: &[String]) -> Vec<(String, Vec<usize>)> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, key) in keys.iter().enumerate() {
        groups.entry(key.as_str()).or_default().push(idx);
    }
    let mut out: Vec<(String, Vec<usize>)> = groups
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    out.sort_by_key(|(k, _)| k == UNCLASSIFIED);
    out
}

// ---------------------------------------------------------------------------
// Merge ordering
// ---------------------------------------------------------------------------

/// Page-order hints taken from the shared settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOrder {
    pub prefix_order: Vec<String>,
    pub customs_only_first: bool,
}

/// Document codes and their display names, in default merge order.
pub const DEFAULT_PREFIXES: [(&str, &str); 4] = [
    ("JS", "정산서"),
    ("NB", "납부영수증"),
    ("VT", "수입세금계산서"),
    ("IMP", "수입신고필증"),
];

impl Default for MergeOrder {
    fn default() -> Self {
        Self {
            prefix_order: DEFAULT_PREFIXES.iter().map(|(p, _)| p.to_string()).collect(),
            customs_only_first: true,
        }
    }
}

impl MergeOrder {
    fn rank(&self, filename: &str) -> isize {
        if self.customs_only_first && is_customs_only_name(filename) {
            return -1;
        }
        let prefix = document_prefix(filename);
        self.prefix_order
            .iter()
            .position(|p| *p == prefix)
            .unwrap_or(self.prefix_order.len()) as isize
    }

    /// Stable sort of `items` by document rank; equal ranks keep input order.
    pub fn sort_by_filename<T>(&self, items: &mut [T], filename: impl Fn(&T) -> &str) {
        items.sort_by_cached_key(|item| self.rank(filename(item)));
    }
}
