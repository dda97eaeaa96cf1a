//! Object key derivation.

use std::path::{Component, Path};

/// Derives the remote object key for a file, from the remote prefix and the
/// file's path relative to the sync root.
///
/// Pure and deterministic: the same `(prefix, relative)` pair always
/// produces the same key. Path separators are normalized to `/`, so the
/// same tree produces the same keys regardless of the platform that
/// ingested it.
pub fn object_key(prefix: &str, relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let mut key = prefix.trim_end_matches('/').to_string();
    key.push('/');
    key.push_str(&parts.join("/"));
    key.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_key_is_deterministic() {
        let rel = PathBuf::from("fhir/patient_001.json");
        let a = object_key("raw_data/20250801-0300", &rel);
        let b = object_key("raw_data/20250801-0300", &rel);
        assert_eq!(a, b);
        assert_eq!(a, "raw_data/20250801-0300/fhir/patient_001.json");
    }

    #[test]
    fn test_trailing_slash_in_prefix_is_ignored() {
        let rel = PathBuf::from("a.json");
        assert_eq!(
            object_key("raw_data/x/", &rel),
            object_key("raw_data/x", &rel)
        );
    }

    #[test]
    fn test_backslashes_are_normalized() {
        // A component containing backslashes (as produced on Windows hosts)
        // must map to the same key as its forward-slash form.
        let windowsish = PathBuf::from("a\\b\\c.json");
        let unixish = PathBuf::from("a/b/c.json");
        assert_eq!(
            object_key("raw_data", &windowsish),
            object_key("raw_data", &unixish)
        );
        assert_eq!(object_key("raw_data", &unixish), "raw_data/a/b/c.json");
    }

    #[test]
    fn test_nested_relative_path() {
        let rel = PathBuf::from("metadata/practitioners/p1.json");
        assert_eq!(
            object_key("raw_data/20250801-0300", &rel),
            "raw_data/20250801-0300/metadata/practitioners/p1.json"
        );
    }

    #[test]
    fn test_current_dir_components_are_dropped() {
        let rel = PathBuf::from("./fhir/a.json");
        assert_eq!(object_key("raw_data", &rel), "raw_data/fhir/a.json");
    }
}
