// ABOUTME: Object-store reconciliation - finds objects no Document row links to
// ABOUTME: Set difference between manifest keys and a county's external keys

use anyhow::{Context, Result};
use std::collections::HashSet;
use tokio_postgres::Client;

/// Result of comparing an object-store listing against the database.
#[derive(Debug, Clone)]
pub struct OrphanReport {
    /// Keys read from the manifest under the prefix
    pub listed: usize,
    /// Keys backed by a Document row
    pub linked: usize,
    /// Keys with no matching Document; candidates for deletion
    pub orphaned: Vec<String>,
}

/// Distinct external keys present in `Document` for a county.
pub async fn document_keys(client: &Client, county_id: i32) -> Result<HashSet<String>> {
    let rows = client
        .query(
            "SELECT DISTINCT \"externalKey\" FROM \"Document\" \
             WHERE \"externalKey\" IS NOT NULL AND \"countyID\" = $1",
            &[&county_id],
        )
        .await
        .context("Failed to fetch document external keys")?;

    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Parse an object-store listing manifest: one key per line, blanks skipped.
///
/// Listing the store is an external concern; operators capture it with
/// whatever tool they have and hand the loader the key list.
pub fn parse_manifest(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// External key encoded in an object key: strip the prefix and the
/// file extension. Keys outside the prefix are not ours to judge.
pub fn key_stem<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = key.strip_prefix(prefix)?;
    let stem = match rest.rfind('.') {
        Some(dot) => &rest[..dot],
        None => rest,
    };
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Object keys under the prefix whose external key has no Document row.
pub fn find_orphaned_keys(
    object_keys: &[String],
    prefix: &str,
    linked_keys: &HashSet<String>,
) -> OrphanReport {
    let mut listed = 0;
    let mut linked = 0;
    let mut orphaned = Vec::new();

    for key in object_keys {
        let Some(stem) = key_stem(key, prefix) else {
            continue;
        };
        listed += 1;
        if linked_keys.contains(stem) {
            linked += 1;
        } else {
            orphaned.push(key.clone());
        }
    }

    orphaned.sort();
    OrphanReport {
        listed,
        linked,
        orphaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_parse_manifest_skips_blanks() {
        let manifest = "Washington/AB123.tif\n\n  Washington/CD456.tif  \n";
        assert_eq!(
            parse_manifest(manifest),
            vec!["Washington/AB123.tif", "Washington/CD456.tif"]
        );
    }

    #[test]
    fn test_key_stem_strips_prefix_and_extension() {
        assert_eq!(key_stem("Washington/AB123.tif", "Washington/"), Some("AB123"));
        assert_eq!(key_stem("Washington/AB123", "Washington/"), Some("AB123"));
        assert_eq!(key_stem("Other/AB123.tif", "Washington/"), None);
        assert_eq!(key_stem("Washington/.tif", "Washington/"), None);
    }

    #[test]
    fn test_find_orphaned_keys() {
        let linked: HashSet<String> = ["AB123".to_string(), "CD456".to_string()].into();
        let listing = keys(&[
            "Washington/AB123.tif",
            "Washington/CD456.tif",
            "Washington/ZZ999.tif",
            "Elsewhere/XX000.tif",
        ]);

        let report = find_orphaned_keys(&listing, "Washington/", &linked);
        assert_eq!(report.listed, 3);
        assert_eq!(report.linked, 2);
        assert_eq!(report.orphaned, vec!["Washington/ZZ999.tif"]);
    }

    #[test]
    fn test_find_orphaned_keys_all_linked() {
        let linked: HashSet<String> = ["AB123".to_string()].into();
        let listing = keys(&["Washington/AB123.tif"]);
        let report = find_orphaned_keys(&listing, "Washington/", &linked);
        assert!(report.orphaned.is_empty());
    }
}
