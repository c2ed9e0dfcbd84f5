//! Mapping of changed source paths to the steps that consume them.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use brisk_pipeline::{ImageKind, Scope, StepKind, StepScope};

use crate::watcher::WatchEvent;

/// Source paths changed since the last build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: BTreeSet<PathBuf>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the path of a watch event.
    pub fn insert(&mut self, event: &WatchEvent) {
        self.paths.insert(event.path().to_path_buf());
    }

    pub fn insert_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Steps to re-run for these changes.
    ///
    /// `source_root` must be in the same form as the recorded paths
    /// (typically both canonical). When every change is an existing image
    /// outside the favicon directory, only the image step runs, restricted
    /// to those files. Otherwise each affected step runs in full. Paths
    /// outside every step's inputs select nothing.
    pub fn scope(&self, source_root: &Path) -> Scope {
        let mut kinds = BTreeSet::new();
        let mut images = Vec::new();
        let mut restrictable = true;

        for path in &self.paths {
            let Ok(rel) = path.strip_prefix(source_root) else {
                continue;
            };
            let Some(Component::Normal(top)) = rel.components().next() else {
                continue;
            };

            match top.to_str() {
                Some("html") => {
                    kinds.insert(StepKind::Html);
                }
                Some("scss") => {
                    kinds.insert(StepKind::Styles);
                }
                Some("js") => {
                    if rel.starts_with("js/vendor") {
                        kinds.insert(StepKind::Vendor);
                    } else if rel == Path::new("js") {
                        kinds.extend([StepKind::Scripts, StepKind::Vendor]);
                    } else {
                        kinds.insert(StepKind::Scripts);
                    }
                }
                Some("img") => {
                    if rel.starts_with("img/favicon") || rel == Path::new("img") {
                        kinds.insert(StepKind::Favicon);
                    }

                    if ImageKind::from_path(rel).is_some() && !path.is_dir() {
                        kinds.insert(StepKind::Images);
                        if path.is_file() && !rel.starts_with("img/favicon") {
                            images.push(relative_to_img(rel));
                        } else {
                            restrictable = false;
                        }
                    } else if path.is_dir() || (!path.exists() && rel.extension().is_none()) {
                        // A directory, or something that may have been one.
                        kinds.insert(StepKind::Images);
                        restrictable = false;
                    }
                }
                _ => {}
            }
        }

        if restrictable && !images.is_empty() && kinds.len() == 1 {
            let mut scope = Scope::default();
            scope.include(StepKind::Images, StepScope::Only(images));
            return scope;
        }

        Scope::of(kinds)
    }
}

fn relative_to_img(rel: &Path) -> PathBuf {
    rel.strip_prefix("img").unwrap_or(rel).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();
        path
    }

    fn scope_of(root: &Path, paths: &[PathBuf]) -> Scope {
        let mut changes = ChangeSet::new();
        for path in paths {
            changes.insert(&WatchEvent::Modified(path.clone()));
        }
        changes.scope(root)
    }

    #[test]
    fn single_image_change_runs_only_that_image() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let logo = touch(root, "img/icons/logo.png");

        let scope = scope_of(root, &[logo]);

        assert_eq!(scope.kinds().collect::<Vec<_>>(), vec![StepKind::Images]);
        assert_eq!(
            scope.get(StepKind::Images),
            Some(&StepScope::Only(vec![PathBuf::from("icons/logo.png")]))
        );
    }

    #[test]
    fn maps_paths_to_their_steps() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let paths = [
            touch(root, "html/partials/nav.html"),
            touch(root, "scss/_vars.scss"),
            touch(root, "js/app.js"),
            touch(root, "js/vendor/jquery.js"),
        ];

        let scope = scope_of(root, &paths);

        assert_eq!(
            scope.kinds().collect::<Vec<_>>(),
            vec![
                StepKind::Html,
                StepKind::Styles,
                StepKind::Scripts,
                StepKind::Vendor
            ]
        );
        assert_eq!(scope.get(StepKind::Html), Some(&StepScope::All));
    }

    #[test]
    fn vendor_only_change_does_not_rebuild_scripts() {
        let temp = tempdir().unwrap();
        let vendor = touch(temp.path(), "js/vendor/lib.js");

        let scope = scope_of(temp.path(), &[vendor]);

        assert_eq!(scope.kinds().collect::<Vec<_>>(), vec![StepKind::Vendor]);
    }

    #[test]
    fn favicon_images_feed_both_steps_in_full() {
        let temp = tempdir().unwrap();
        let icon = touch(temp.path(), "img/favicon/icon.png");

        let scope = scope_of(temp.path(), &[icon]);

        assert_eq!(
            scope.kinds().collect::<Vec<_>>(),
            vec![StepKind::Favicon, StepKind::Images]
        );
        assert_eq!(scope.get(StepKind::Images), Some(&StepScope::All));
    }

    #[test]
    fn mixed_batches_run_steps_in_full() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let paths = [touch(root, "img/a.png"), touch(root, "html/index.html")];

        let scope = scope_of(root, &paths);

        assert_eq!(scope.get(StepKind::Images), Some(&StepScope::All));
        assert!(scope.contains(StepKind::Html));
    }

    #[test]
    fn removed_image_runs_full_image_step() {
        let temp = tempdir().unwrap();
        let gone = temp.path().join("img/gone.png");

        let scope = scope_of(temp.path(), &[gone]);

        assert_eq!(scope.get(StepKind::Images), Some(&StepScope::All));
    }

    #[test]
    fn ignores_unrelated_paths() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let paths = [
            touch(root, "img/readme.txt"),
            touch(root, "notes.md"),
            PathBuf::from("/elsewhere/app.js"),
        ];

        assert!(scope_of(root, &paths).is_empty());
    }

    #[test]
    fn new_image_directory_runs_full_image_step() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("img/gallery");
        fs::create_dir_all(&dir).unwrap();

        let scope = scope_of(temp.path(), &[dir]);

        assert_eq!(scope.kinds().collect::<Vec<_>>(), vec![StepKind::Images]);
        assert_eq!(scope.get(StepKind::Images), Some(&StepScope::All));
    }
}
