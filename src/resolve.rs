//! Request-path resolution against the served root.

use camino::{Utf8Path, Utf8PathBuf};
use path_clean::PathClean;

/// Resolve a slash-delimited request path to an on-disk path under `root`.
///
/// The name is treated as host-independent: a missing leading `/` is
/// supplied, and `.`/`..` segments are cleaned before joining, so the
/// result always stays inside the (normalized) root. Names containing NUL
/// bytes, or the host path separator on hosts where that is not `/`, are
/// rejected with `None`. An empty root serves the current directory.
#[must_use]
pub fn resolve(root: &Utf8Path, name: &str) -> Option<Utf8PathBuf> {
    if name.contains('\0') {
        return None;
    }
    if std::path::MAIN_SEPARATOR != '/' && name.contains(std::path::MAIN_SEPARATOR) {
        return None;
    }

    let rooted = if name.starts_with('/') {
        name.to_owned()
    } else {
        format!("/{name}")
    };
    let cleaned = Utf8PathBuf::from_path_buf(std::path::PathBuf::from(rooted).clean()).ok()?;
    let relative = cleaned.strip_prefix("/").unwrap_or(&cleaned);

    let base = if root.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        root
    };
    Some(base.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_name_lands_under_root() {
        let resolved = resolve(Utf8Path::new("/srv/data"), "/docs/a.txt").expect("resolved");
        assert_eq!(resolved, Utf8PathBuf::from("/srv/data/docs/a.txt"));
    }

    #[test]
    fn missing_leading_slash_is_supplied() {
        let resolved = resolve(Utf8Path::new("/srv/data"), "docs/a.txt").expect("resolved");
        assert_eq!(resolved, Utf8PathBuf::from("/srv/data/docs/a.txt"));
    }

    #[test]
    fn parent_segments_cannot_escape() {
        let resolved = resolve(Utf8Path::new("/srv/data"), "/../../etc/passwd").expect("resolved");
        assert_eq!(resolved, Utf8PathBuf::from("/srv/data/etc/passwd"));
    }

    #[test]
    fn nul_bytes_are_rejected() {
        assert_eq!(resolve(Utf8Path::new("/srv/data"), "a\0b"), None);
    }

    #[test]
    fn empty_root_serves_current_directory() {
        let resolved = resolve(Utf8Path::new(""), "/a.txt").expect("resolved");
        assert_eq!(resolved, Utf8PathBuf::from("./a.txt"));
    }

    #[test]
    fn root_path_resolves_to_root() {
        let resolved = resolve(Utf8Path::new("/srv/data"), "/").expect("resolved");
        assert_eq!(resolved, Utf8PathBuf::from("/srv/data"));
    }

    proptest! {
        #[test]
        fn resolved_paths_stay_within_root(
            segments in prop::collection::vec(
                prop_oneof![
                    "[a-z0-9]{1,6}".prop_map(|s| s),
                    Just("..".to_string()),
                    Just(".".to_string()),
                ],
                1..6,
            )
        ) {
            let name = format!("/{}", segments.join("/"));
            let root = Utf8Path::new("/srv/data");
            if let Some(resolved) = resolve(root, &name) {
                prop_assert!(resolved.starts_with(root));
            }
        }
    }
}
