//! On-disk repository
//!
//! A repository is a `.batchline/` directory holding the metadata database,
//! the per-worker directories and the configuration file:
//!
//! ```text
//! .batchline/
//!   config.yaml
//!   meta.db
//!   workers/<id>/
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::infrastructure::config::{Config, ConfigError};
use crate::store::{Store, StoreError};

/// Name of the repository directory
pub const REPOSITORY_DIR: &str = ".batchline";

const DATABASE_FILE: &str = "meta.db";
const WORKERS_DIR: &str = "workers";
const CONFIG_FILE: &str = "config.yaml";

/// Errors raised while bootstrapping or attaching a repository
#[derive(Error, Debug)]
pub enum RepoError {
    /// No repository exists at the path
    #[error("no repository at {} (run `batchline init`)", path.display())]
    NotFound {
        /// Expected repository directory.
        path: PathBuf,
    },

    /// A repository already exists at the path
    #[error("repository already exists at {}", path.display())]
    AlreadyExists {
        /// Existing repository directory.
        path: PathBuf,
    },

    /// Filesystem error
    #[error("{}: {source}", path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The metadata store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// An attached repository
#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    store: Store,
    config: Config,
}

impl Repository {
    /// Repository directory under `root`
    #[must_use]
    pub fn dir_for(root: &Path) -> PathBuf {
        root.join(REPOSITORY_DIR)
    }

    /// Creates a repository under `root`
    ///
    /// On failure the partially created directory is removed again.
    ///
    /// # Errors
    ///
    /// Fails when a repository already exists or bootstrap fails.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let root = absolute_root(root.into())?;
        let dir = Self::dir_for(&root);
        if dir.exists() {
            return Err(RepoError::AlreadyExists { path: dir });
        }

        match Self::bootstrap(root).await {
            Ok(repo) => {
                tracing::info!(path = %dir.display(), "Repository created");
                Ok(repo)
            }
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(path = %dir.display(), error = %cleanup, "Failed to remove partial repository");
                }
                Err(err)
            }
        }
    }

    /// Attaches to the repository under `root`
    ///
    /// # Errors
    ///
    /// Fails when no repository exists or it cannot be opened.
    pub async fn attach(root: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let root = absolute_root(root.into())?;
        let dir = Self::dir_for(&root);
        if !dir.is_dir() {
            return Err(RepoError::NotFound { path: dir });
        }
        Self::open(root).await
    }

    /// Attaches to the repository under `root`, creating it if needed
    ///
    /// # Errors
    ///
    /// Fails when the repository cannot be created or opened.
    pub async fn attach_or_create(root: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let root = root.into();
        if Self::dir_for(&root).is_dir() {
            Self::attach(root).await
        } else {
            Self::create(root).await
        }
    }

    /// Removes the repository with its database and worker directories
    ///
    /// Jobs still queued on the scheduler are not cancelled.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be removed.
    pub async fn destroy(self) -> Result<(), RepoError> {
        self.store.close().await;
        let dir = self.dir();
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|source| RepoError::Io {
                path: dir.clone(),
                source,
            })?;
        tracing::info!(path = %dir.display(), "Repository destroyed");
        Ok(())
    }

    /// Directory the repository lives in
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.batchline/` directory
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        Self::dir_for(&self.root)
    }

    /// Metadata database path
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.dir().join(DATABASE_FILE)
    }

    /// Parent of the worker directories
    #[must_use]
    pub fn workers_path(&self) -> PathBuf {
        self.dir().join(WORKERS_DIR)
    }

    /// Configuration file path
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir().join(CONFIG_FILE)
    }

    /// Entity store
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Loaded configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn bootstrap(root: PathBuf) -> Result<Self, RepoError> {
        let workers = Self::dir_for(&root).join(WORKERS_DIR);
        tokio::fs::create_dir_all(&workers)
            .await
            .map_err(|source| RepoError::Io {
                path: workers,
                source,
            })?;

        let repo = Self::open(root).await?;
        repo.config.save(&repo.config_path())?;
        Ok(repo)
    }

    async fn open(root: PathBuf) -> Result<Self, RepoError> {
        let dir = Self::dir_for(&root);
        let config = Config::load(&dir.join(CONFIG_FILE))?;
        let store = Store::open(dir.join(DATABASE_FILE), dir.join(WORKERS_DIR)).await?;
        tracing::debug!(path = %dir.display(), "Repository attached");
        Ok(Self {
            root,
            store,
            config,
        })
    }
}

fn absolute_root(root: PathBuf) -> Result<PathBuf, RepoError> {
    std::path::absolute(&root).map_err(|source| RepoError::Io { path: root, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path()).await.unwrap();

        assert!(repo.db_path().is_file());
        assert!(repo.workers_path().is_dir());
        assert!(repo.config_path().is_file());
        assert_eq!(repo.config(), &Config::default());
    }

    #[tokio::test]
    async fn test_paths_are_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path()).await.unwrap();
        assert!(repo.root().is_absolute());
        assert!(repo.store().worker_dir(1).is_absolute());
        assert_eq!(repo.store().workers_root(), repo.workers_path());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        Repository::create(dir.path()).await.unwrap();
        let err = Repository::create(dir.path()).await.unwrap_err();
        assert!(matches!(err, RepoError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_attach_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::attach(dir.path()).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound { .. }));
        assert!(!Repository::dir_for(dir.path()).exists());
    }

    #[tokio::test]
    async fn test_attach_or_create_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let first = Repository::attach_or_create(dir.path()).await.unwrap();
        first.store().close().await;

        let second = Repository::attach_or_create(dir.path()).await.unwrap();
        assert_eq!(second.db_path(), Repository::dir_for(dir.path()).join("meta.db"));
    }

    #[tokio::test]
    async fn test_failed_create_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the repository's parent should be
        let root = dir.path().join("occupied");
        std::fs::write(&root, "").unwrap();

        assert!(Repository::create(&root).await.is_err());
        assert!(!Repository::dir_for(&root).exists());
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::create(dir.path()).await.unwrap();
        repo.destroy().await.unwrap();
        assert!(!Repository::dir_for(dir.path()).exists());
    }
}
