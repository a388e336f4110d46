//! Language detection, path normalization and content hashing

use std::path::{Component, Path, PathBuf};

/// Extension → language name
const EXTENSIONS: &[(&str, &str)] = &[
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("mts", "typescript"),
    ("cts", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("py", "python"),
    ("pyi", "python"),
    ("rs", "rust"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("rb", "ruby"),
    ("php", "php"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("hh", "cpp"),
    ("cs", "csharp"),
    ("swift", "swift"),
    ("scala", "scala"),
];

/// Detect a file's language from its extension
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    EXTENSIONS
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, language)| *language)
}

/// Make a path absolute and lexically remove `.` and `..` components.
///
/// Symlinks are not resolved, the file does not need to exist.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// [`normalize_path`] as the string key stored in the graph
pub fn normalize_path_str(path: &str) -> String {
    normalize_path(Path::new(path)).to_string_lossy().into_owned()
}

/// Content digest recorded in the file ledger
pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("/src/app.tsx")), Some("typescript"));
        assert_eq!(detect_language(Path::new("lib/util.PY")), Some("python"));
        assert_eq!(detect_language(Path::new("main.rs")), Some("rust"));
        assert_eq!(detect_language(Path::new("README.md")), None);
        assert_eq!(detect_language(Path::new("Makefile")), None);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/repo/src/./lib/../main.ts")),
            PathBuf::from("/repo/src/main.ts")
        );
        assert!(normalize_path(Path::new("src/main.ts")).is_absolute());
        assert_eq!(normalize_path_str("/a/b/../c.ts"), "/a/c.ts");
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let a = content_hash(b"export function a() {}");
        let b = content_hash(b"export function b() {}");
        assert_ne!(a, b);
        assert_eq!(a, content_hash(b"export function a() {}"));
        assert_eq!(a.len(), 64);
    }
}
