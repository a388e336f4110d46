use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Path filter for indexing sweeps: .gitignore/.ignore, built-in noise, user excludes
pub struct IgnoreFilter {
    inner: Gitignore,
}

impl IgnoreFilter {
    pub fn new(root: &Path, extra_excludes: &[String]) -> Self {
        let mut builder = GitignoreBuilder::new(root);

        // 1. Load from .gitignore and .ignore
        builder.add(root.join(".gitignore"));
        builder.add(root.join(".ignore"));

        // 2. Add defaults (global)
        let defaults = [
            // Dependency and build output
            "target/", "node_modules/", "venv/", ".venv/", "vendor/",
            "dist/", "build/", "out/", "coverage/", "__pycache__/",
            ".git/", ".codegraph/", ".vscode/", ".idea/",
            // Generated sources
            "*.min.js", "*.bundle.js", "*.d.ts.map",
        ];

        for pattern in defaults {
            // Static patterns, known to parse
            builder.add_line(None, pattern).ok();
        }

        // 3. Add user config excludes
        for pattern in extra_excludes {
            if let Err(e) = builder.add_line(None, pattern) {
                tracing::warn!("Ignoring invalid exclude pattern '{}': {}", pattern, e);
            }
        }

        Self {
            inner: builder.build().unwrap_or_else(|_| Gitignore::empty()),
        }
    }

    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.inner.matched_path_or_any_parents(path, is_dir).is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let filter = IgnoreFilter::new(root, &["generated/".to_string()]);

        assert!(filter.is_ignored(&root.join("node_modules/lib/index.js"), false));
        assert!(filter.is_ignored(&root.join("generated/api.ts"), false));
        assert!(!filter.is_ignored(&root.join("src/api.ts"), false));
    }

    #[test]
    fn test_reads_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "legacy/\n").unwrap();
        let filter = IgnoreFilter::new(dir.path(), &[]);

        assert!(filter.is_ignored(&dir.path().join("legacy/old.py"), false));
        assert!(!filter.is_ignored(&dir.path().join("new.py"), false));
    }
}
