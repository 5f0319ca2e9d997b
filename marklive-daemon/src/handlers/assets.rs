//! Static asset path registrar.
//!
//! Remembers the directory of every added file so relative assets
//! (`![](img/a.png)`) referenced by a preview resolve under `/static/`.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use marklive_core::{identity, Command, CommandError, Handler, ResourceId, ResourceKind};

pub struct AssetPaths {
    /// Configured directory, always searched first.
    assets_dir: Option<PathBuf>,
    /// Parent directories of tracked files, in registration order.
    dirs: Mutex<Vec<(ResourceId, PathBuf)>>,
}

impl AssetPaths {
    pub fn new(assets_dir: Option<PathBuf>) -> Self {
        Self {
            assets_dir,
            dirs: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a `/static/` relative path to an existing file. Paths that
    /// are absolute or climb with `..` never resolve.
    pub fn resolve(&self, rel: &str) -> Option<PathBuf> {
        let rel = Path::new(rel);
        if rel.as_os_str().is_empty()
            || !rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }

        let registered: Vec<PathBuf> = self.dirs.lock().iter().map(|(_, dir)| dir.clone()).collect();
        self.assets_dir
            .iter()
            .chain(registered.iter())
            .map(|dir| dir.join(rel))
            .find(|candidate| candidate.is_file())
    }

    pub fn dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().iter().map(|(_, dir)| dir.clone()).collect()
    }

    fn register(&self, path: &Path) {
        // The file handler reports unreadable paths; nothing to add here.
        let Ok((canonical, id)) = identity::resolve_file(path) else {
            return;
        };
        let Some(dir) = canonical.parent().map(Path::to_path_buf) else {
            return;
        };
        let mut dirs = self.dirs.lock();
        if !dirs.iter().any(|(known, _)| *known == id) {
            tracing::debug!(id = %id, dir = %dir.display(), "registered asset directory");
            dirs.push((id, dir));
        }
    }
}

#[async_trait]
impl Handler for AssetPaths {
    fn name(&self) -> &'static str {
        "assets"
    }

    async fn serve(&self, command: Arc<Command>) -> Result<(), CommandError> {
        match &*command {
            Command::AddFile { path } => self.register(path),
            Command::Delete { id } if id.is(ResourceKind::File) => {
                self.dirs.lock().retain(|(known, _)| known != id);
            }
            Command::Shutdown => self.dirs.lock().clear(),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn add(assets: &AssetPaths, path: &Path) -> ResourceId {
        assets.register(path);
        identity::resolve_file(path).unwrap().1
    }

    #[test]
    fn resolves_next_to_registered_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "![](img.png)").unwrap();
        std::fs::write(dir.path().join("img.png"), b"png").unwrap();

        let assets = AssetPaths::new(None);
        assert!(assets.resolve("img.png").is_none());
        add(&assets, &dir.path().join("a.md"));
        assert!(assets.resolve("img.png").is_some());
    }

    #[test]
    fn configured_dir_wins_over_registered_dirs() {
        let docs = TempDir::new().unwrap();
        let shared = TempDir::new().unwrap();
        std::fs::write(docs.path().join("a.md"), "# a").unwrap();
        std::fs::write(docs.path().join("style.css"), "docs").unwrap();
        std::fs::write(shared.path().join("style.css"), "shared").unwrap();

        let assets = AssetPaths::new(Some(shared.path().to_path_buf()));
        add(&assets, &docs.path().join("a.md"));
        let found = assets.resolve("style.css").unwrap();
        assert_eq!(std::fs::read_to_string(found).unwrap(), "shared");
    }

    #[test]
    fn parent_and_absolute_paths_are_rejected() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("docs");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("a.md"), "# a").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "x").unwrap();

        let assets = AssetPaths::new(None);
        add(&assets, &nested.join("a.md"));
        assert!(assets.resolve("../secret.txt").is_none());
        assert!(assets.resolve(dir.path().join("secret.txt").to_str().unwrap()).is_none());
        assert!(assets.resolve("").is_none());
    }

    #[tokio::test]
    async fn delete_forgets_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "# a").unwrap();
        let assets = AssetPaths::new(None);
        let id = add(&assets, &dir.path().join("a.md"));
        add(&assets, &dir.path().join("a.md"));
        assert_eq!(assets.dirs().len(), 1);

        assets.serve(Arc::new(Command::Delete { id })).await.unwrap();
        assert!(assets.dirs().is_empty());
    }
}
