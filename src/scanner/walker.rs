//! Stable-ordered directory traversal with cursor resume.
//!
//! Every walk over an unchanged tree yields files in the same order:
//! full paths sorted lexicographically across all roots. That order is
//! what makes the pause cursor meaningful; a resumed run picks up
//! strictly after the last path the previous batch finished.

use crate::core::config::ScanConfig;
use crate::core::error::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One slice of the traversal.
#[derive(Debug)]
pub struct WalkBatch {
    /// Files for this batch, in stable order.
    pub files: Vec<PathBuf>,
    /// Whether the traversal has no files beyond this batch.
    pub exhausted: bool,
}

/// Directory walker bound to a scan configuration.
pub struct FileWalker {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
    exclude_paths: Vec<String>,
    follow_symlinks: bool,
}

impl FileWalker {
    /// Create a walker from the scan configuration.
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            roots: config.roots.clone(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            exclude_paths: config.exclude_paths.clone(),
            follow_symlinks: config.follow_symlinks,
        }
    }

    /// Check if a path should be excluded from scanning.
    pub fn should_exclude(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.exclude_paths
            .iter()
            .any(|excluded| path_str.contains(excluded.as_str()))
    }

    fn matches_extension(&self, path: &Path) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy().to_lowercase();
                self.extensions.contains(&ext)
            }
            None => false,
        }
    }

    /// Walk all roots and return every candidate file in stable order.
    fn collect(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for root in &self.roots {
            if !root.exists() {
                log::warn!("scan root does not exist, skipping: {}", root.display());
                continue;
            }

            let walker = WalkDir::new(root)
                .follow_links(self.follow_symlinks)
                .into_iter()
                .filter_entry(|e| !self.should_exclude(e.path()));

            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        log::debug!("walk error, skipping entry: {}", e);
                        continue;
                    }
                };

                // Symlinked files only count when following links.
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                if !self.matches_extension(path) {
                    continue;
                }

                files.push(path.to_path_buf());
            }
        }

        // Sort by the string form so the cursor comparison in
        // next_batch sees the same ordering.
        files.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
        files.dedup();
        Ok(files)
    }

    /// Yield the next batch of at most `limit` files, starting strictly
    /// after `cursor` in the stable order. A cursor pointing at a file
    /// that has since been deleted still resumes at the right place.
    pub fn next_batch(&self, cursor: Option<&str>, limit: usize) -> Result<WalkBatch> {
        let all = self.collect()?;

        let start = match cursor {
            Some(cursor) => all.partition_point(|p| p.to_string_lossy().as_ref() <= cursor),
            None => 0,
        };

        let remaining = &all[start..];
        let take = remaining.len().min(limit);

        Ok(WalkBatch {
            files: remaining[..take].to_vec(),
            exhausted: take == remaining.len(),
        })
    }

    /// Total candidate files under the configured roots.
    pub fn count_files(&self) -> Result<usize> {
        Ok(self.collect()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn walker_for(root: &Path) -> FileWalker {
        let mut config = ScanConfig::default();
        config.roots = vec![root.to_path_buf()];
        FileWalker::new(&config)
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"<?php\n").unwrap();
        path
    }

    #[test]
    fn test_stable_order_across_walks() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "c.php");
        touch(dir.path(), "a.php");
        touch(dir.path(), "sub/b.php");

        let walker = walker_for(dir.path());
        let first = walker.next_batch(None, 100).unwrap();
        let second = walker.next_batch(None, 100).unwrap();

        assert_eq!(first.files, second.files);
        assert_eq!(first.files.len(), 3);
        let sorted = {
            let mut v = first.files.clone();
            v.sort();
            v
        };
        assert_eq!(first.files, sorted);
    }

    #[test]
    fn test_extension_allowlist() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "keep.php");
        touch(dir.path(), "keep.js");
        touch(dir.path(), "skip.txt");
        touch(dir.path(), "noext");

        let walker = walker_for(dir.path());
        let batch = walker.next_batch(None, 100).unwrap();
        let names: Vec<_> = batch
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names.len(), 2);
        assert!(names.contains(&"keep.php".to_string()));
        assert!(names.contains(&"keep.js".to_string()));
    }

    #[test]
    fn test_exclude_paths() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "site/index.php");
        touch(dir.path(), "site/vendor/lib.php");
        touch(dir.path(), "site/node_modules/x.js");

        let walker = walker_for(dir.path());
        let batch = walker.next_batch(None, 100).unwrap();

        assert_eq!(batch.files.len(), 1);
        assert!(batch.files[0].ends_with("site/index.php"));
    }

    #[test]
    fn test_cursor_resume_no_gap_no_overlap() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            touch(dir.path(), &format!("f{:02}.php", i));
        }

        let walker = walker_for(dir.path());
        let first = walker.next_batch(None, 4).unwrap();
        assert_eq!(first.files.len(), 4);
        assert!(!first.exhausted);

        let cursor = first.files.last().unwrap().to_string_lossy().to_string();
        let second = walker.next_batch(Some(&cursor), 100).unwrap();
        assert_eq!(second.files.len(), 6);
        assert!(second.exhausted);

        // No path appears in both batches.
        for path in &second.files {
            assert!(!first.files.contains(path));
        }
    }

    #[test]
    fn test_cursor_survives_deleted_file() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.php");
        touch(dir.path(), "b.php");
        touch(dir.path(), "c.php");

        let walker = walker_for(dir.path());
        let cursor = a.to_string_lossy().to_string();
        fs::remove_file(&a).unwrap();

        let batch = walker.next_batch(Some(&cursor), 100).unwrap();
        assert_eq!(batch.files.len(), 2);
        assert!(batch.exhausted);
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.php");

        let mut config = ScanConfig::default();
        config.roots = vec![dir.path().to_path_buf(), PathBuf::from("/nonexistent/root")];
        let walker = FileWalker::new(&config);

        let batch = walker.next_batch(None, 100).unwrap();
        assert_eq!(batch.files.len(), 1);
    }

    #[test]
    fn test_exhausted_flag_at_exact_boundary() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.php");
        touch(dir.path(), "b.php");

        let walker = walker_for(dir.path());
        let batch = walker.next_batch(None, 2).unwrap();
        assert_eq!(batch.files.len(), 2);
        assert!(batch.exhausted);
    }
}
