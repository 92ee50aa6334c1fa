//! Local path derivation for mirrored document trees.
//!
//! Children of a document live in a directory named after the parent's file
//! stem, so a tree `A -> [B, C]`, `B -> [D]` maps to:
//!
//! ```text
//! docs/a.md
//! docs/a/b.md
//! docs/a/c.md
//! docs/a/b/d.md
//! ```
//!
//! All functions here are pure; mapping never fails for valid input.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Converts a page title to a filesystem-safe slug: lower-cased, runs of
/// non-alphanumeric characters collapsed to a single hyphen, trimmed.
pub fn slugify(title: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
    let lowered = title.to_lowercase();
    re.replace_all(&lowered, "-").trim_matches('-').to_string()
}

/// Slug used as a file stem. Titles that slugify to nothing (emoji-only,
/// punctuation-only) fall back to the remote id.
pub fn file_stem(title: &str, remote_id: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        remote_id.to_string()
    } else {
        slug
    }
}

/// The directory that holds a document's children: a sibling of the
/// document file, named after its stem.
pub fn children_dir(doc_path: &Path) -> PathBuf {
    let stem = doc_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    doc_path.parent().unwrap_or(Path::new("")).join(stem)
}

/// Computes one `.md` path per sibling, in input order.
///
/// Siblings whose titles slugify identically collide; the entry with the
/// lexicographically smallest remote id keeps the bare slug and every other
/// colliding entry gets the remote id appended, so the outcome does not
/// depend on traversal order.
pub fn sibling_paths(dir: &Path, siblings: &[(String, String)]) -> Vec<PathBuf> {
    let mut by_slug: HashMap<String, Vec<&str>> = HashMap::new();
    for (id, title) in siblings {
        by_slug.entry(file_stem(title, id)).or_default().push(id);
    }
    for ids in by_slug.values_mut() {
        ids.sort_unstable();
    }

    siblings
        .iter()
        .map(|(id, title)| {
            let slug = file_stem(title, id);
            let stem = if by_slug[&slug][0] == id.as_str() {
                slug
            } else {
                format!("{slug}-{id}")
            };
            dir.join(format!("{stem}.md"))
        })
        .collect()
}
