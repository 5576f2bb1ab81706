//! File path canonicalization for comparing retrieved and expected paths.
//!
//! Search results and golden entries come from different indexing runs and
//! platforms, so paths are compared in a normalized form: forward slashes,
//! no leading `./` or `/`, no trailing `/`, lowercase.

use std::collections::HashSet;

/// Normalize a file path for comparison.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut last_was_slash = false;

    for c in path.trim().chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        normalized.push(c);
    }

    let mut rest = normalized.as_str();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }

    rest.trim_end_matches('/').to_lowercase()
}

/// Normalize and deduplicate paths, keeping the first (best-ranked)
/// occurrence of each file.
pub fn dedupe_paths<S: AsRef<str>>(paths: &[S]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(paths.len());
    let mut deduped = Vec::with_capacity(paths.len());

    for path in paths {
        let normalized = normalize_path(path.as_ref());
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.clone()) {
            deduped.push(normalized);
        }
    }

    deduped
}

/// Normalized set of paths, ignoring entries that normalize to nothing.
pub fn path_set<S: AsRef<str>>(paths: &[S]) -> HashSet<String> {
    paths
        .iter()
        .map(|p| normalize_path(p.as_ref()))
        .filter(|p| !p.is_empty())
        .collect()
}
