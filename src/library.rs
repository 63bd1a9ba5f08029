//! Component library
//!
//! Tasks and workflows are looked up by file name across an ordered list of
//! search paths. Each path holds `tasks/` and `workflows/` directories; the
//! first path containing the file wins.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::repo::Repository;

/// Environment variable holding extra search paths, separated by `:`
pub const LIB_ENV: &str = "BATCHLINE_LIB";

/// Kind of library component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Shell template for one step
    Task,
    /// Definition combining tasks
    Workflow,
}

impl Component {
    /// Directory holding this kind of component
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Task => "tasks",
            Self::Workflow => "workflows",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Task => "task",
            Self::Workflow => "workflow",
        })
    }
}

/// Ordered search paths for tasks and workflows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Library {
    paths: Vec<PathBuf>,
}

impl Library {
    /// Creates a library searching `paths` in order
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Library for the repository under `repo_root`, followed by `$BATCHLINE_LIB`
    #[must_use]
    pub fn from_env(repo_root: &Path) -> Self {
        Self::with_search_list(repo_root, std::env::var(LIB_ENV).ok().as_deref())
    }

    /// Library for the repository under `repo_root`, followed by the
    /// `:`-separated `search_list`
    #[must_use]
    pub fn with_search_list(repo_root: &Path, search_list: Option<&str>) -> Self {
        let extra = search_list
            .into_iter()
            .flat_map(|list| list.split(':'))
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        Self::new(std::iter::once(Repository::dir_for(repo_root)).chain(extra))
    }

    /// Search paths in lookup order
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// First existing `<path>/<component>s/<file_name>`
    #[must_use]
    pub fn find(&self, component: Component, file_name: &str) -> Option<PathBuf> {
        let found = self
            .paths
            .iter()
            .map(|path| path.join(component.dir_name()).join(file_name))
            .find(|candidate| candidate.is_file());
        tracing::trace!(%component, file_name, found = ?found, "Library lookup");
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_repository_is_searched_first() {
        let root = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        let list = format!("{}:", shared.path().display());

        let library = Library::with_search_list(root.path(), Some(list.as_str()));
        assert_eq!(
            library.paths(),
            [Repository::dir_for(root.path()), shared.path().to_path_buf()]
        );

        touch(&shared.path().join("tasks/trim.sh"));
        assert_eq!(
            library.find(Component::Task, "trim.sh"),
            Some(shared.path().join("tasks/trim.sh"))
        );

        let local = Repository::dir_for(root.path()).join("tasks/trim.sh");
        touch(&local);
        assert_eq!(library.find(Component::Task, "trim.sh"), Some(local));
    }

    #[test]
    fn test_components_are_separate() {
        let lib = tempfile::tempdir().unwrap();
        touch(&lib.path().join("tasks/align.sh"));

        let library = Library::new([lib.path()]);
        assert!(library.find(Component::Workflow, "align.sh").is_none());
        assert!(library.find(Component::Task, "missing.sh").is_none());
    }

    #[test]
    fn test_no_search_list() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(Library::with_search_list(root.path(), None).paths().len(), 1);
    }
}
