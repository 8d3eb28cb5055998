//! The build hash.

use peaque_transform::short_hash;

/// First eight hex characters of SHA-1 over the frontend entry source.
/// Names the asset directory (`assets-<hash>`) and prefixes public URLs.
pub fn build_hash(bundle_entry_source: &str) -> String {
    short_hash(bundle_entry_source.as_bytes(), 8)
}

/// The asset-directory name for a given entry source.
pub fn asset_dir_name(bundle_entry_source: &str) -> String {
    format!("assets-{}", build_hash(bundle_entry_source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_for_identical_input() {
        let entry = "import App from \"./src/pages/page\";\n";
        assert_eq!(build_hash(entry), build_hash(entry));
        assert_eq!(asset_dir_name(entry), asset_dir_name(entry));
    }

    #[test]
    fn hash_is_eight_hex_chars() {
        let hash = build_hash("anything");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_entries_differ() {
        assert_ne!(build_hash("a"), build_hash("b"));
    }
}
