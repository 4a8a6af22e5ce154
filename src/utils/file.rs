//! Filesystem access with optional scope sandboxing.

use std::fs;
use std::path::{Component, Path};

use crate::models::{SubError, SubResult};

pub fn file_exists(path: &str) -> bool {
    Path::new(path).is_file()
}

/// Reject paths that could escape the serving scope: absolute paths and any
/// `..` component.
pub fn path_escapes_scope(path: &str) -> bool {
    let p = Path::new(path);
    p.is_absolute() || p.components().any(|c| matches!(c, Component::ParentDir))
}

/// Read a file as text. When `scope` is given the path must stay inside it.
pub fn file_get(path: &str, scope: Option<&str>) -> SubResult<String> {
    let full_path = match scope {
        Some(base) => {
            if path_escapes_scope(path) {
                return Err(SubError::Forbidden);
            }
            Path::new(base).join(path)
        }
        None => Path::new(path).to_path_buf(),
    };

    fs::read_to_string(&full_path)
        .map(|content| crate::utils::string::strip_bom(&content).to_string())
        .map_err(|e| SubError::fetch(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_scope_escape_detection() {
        assert!(path_escapes_scope("../pref.yml"));
        assert!(path_escapes_scope("/etc/passwd"));
        assert!(path_escapes_scope("rules/../../secret"));
        assert!(!path_escapes_scope("rules/direct.list"));
    }

    #[test]
    fn test_file_get_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("a.txt")).unwrap();
        f.write_all(b"content").unwrap();

        let scope = dir.path().to_str().unwrap();
        assert_eq!(file_get("a.txt", Some(scope)).unwrap(), "content");
        assert!(matches!(
            file_get("../a.txt", Some(scope)),
            Err(SubError::Forbidden)
        ));
    }

    #[test]
    fn test_file_get_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bom.txt");
        std::fs::write(&path, "\u{feff}data").unwrap();
        assert_eq!(file_get(path.to_str().unwrap(), None).unwrap(), "data");
    }
}
