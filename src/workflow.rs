//! Workflow definitions
//!
//! A workflow is a YAML file under `workflows/` naming the tasks to run for
//! every sample:
//!
//! ```yaml
//! compose: serial        # or parallel
//! tasks: [trim, align]   # tasks/trim.sh, tasks/align.sh
//! vars:
//!   reference: /data/hg38.fa
//! ```
//!
//! Task files are templates; besides the workflow `vars` they can use
//! `{{ sample }}` and their own `{{ log }}`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::block::{Block, Composition, Template, Vars};
use crate::library::{Component, Library};

/// Variable holding the sample name
pub const SAMPLE_VAR: &str = "sample";

/// Errors raised while loading a workflow
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// No workflow file with this name in the library
    #[error("workflow '{name}' not found in library")]
    NotFound {
        /// Workflow name.
        name: String,
    },

    /// A task named by the workflow is missing from the library
    #[error("workflow '{workflow}': task '{task}' not found in library")]
    TaskNotFound {
        /// Workflow name.
        workflow: String,
        /// Missing task name.
        task: String,
    },

    /// The workflow names no tasks
    #[error("workflow '{name}' has no tasks")]
    Empty {
        /// Workflow name.
        name: String,
    },

    /// The workflow file could not be read
    #[error("{}: {source}", path.display())]
    Read {
        /// Workflow file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The workflow file is not valid
    #[error("invalid workflow {}: {source}", path.display())]
    Parse {
        /// Workflow file.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Definition {
    #[serde(default)]
    compose: Composition,
    tasks: Vec<String>,
    #[serde(default)]
    vars: Vars,
}

/// A loaded workflow with its tasks resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    name: String,
    compose: Composition,
    tasks: Vec<(String, PathBuf)>,
    vars: Vars,
}

impl Workflow {
    /// Loads workflow `name` from `library`
    ///
    /// `name` may be a file name or a stem completed with `.yml` or `.yaml`.
    ///
    /// # Errors
    ///
    /// Fails when the workflow or one of its tasks cannot be found, or the
    /// file is invalid.
    pub fn load(library: &Library, name: &str) -> Result<Self, WorkflowError> {
        let path = [name.to_string(), format!("{name}.yml"), format!("{name}.yaml")]
            .iter()
            .find_map(|file| library.find(Component::Workflow, file))
            .ok_or_else(|| WorkflowError::NotFound {
                name: name.to_string(),
            })?;
        let text = std::fs::read_to_string(&path).map_err(|source| WorkflowError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(library, name, &text, &path)
    }

    fn parse(library: &Library, name: &str, text: &str, path: &Path) -> Result<Self, WorkflowError> {
        let definition: Definition =
            serde_yaml::from_str(text).map_err(|source| WorkflowError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if definition.tasks.is_empty() {
            return Err(WorkflowError::Empty {
                name: name.to_string(),
            });
        }

        let tasks = definition
            .tasks
            .into_iter()
            .map(|task| {
                let file = if Path::new(&task).extension().is_some() {
                    task.clone()
                } else {
                    format!("{task}.sh")
                };
                library
                    .find(Component::Task, &file)
                    .map(|path| (task.clone(), path))
                    .ok_or_else(|| WorkflowError::TaskNotFound {
                        workflow: name.to_string(),
                        task,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(workflow = name, tasks = tasks.len(), "Workflow loaded");
        Ok(Self {
            name: name.to_string(),
            compose: definition.compose,
            tasks,
            vars: definition.vars,
        })
    }

    /// Workflow name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved task names and template files, in order
    #[must_use]
    pub fn tasks(&self) -> &[(String, PathBuf)] {
        &self.tasks
    }

    /// Builds the block tree for one sample
    #[must_use]
    pub fn block_for(&self, sample: &str) -> Block {
        let children = self
            .tasks
            .iter()
            .map(|(task, path)| Block::leaf(task.clone(), Template::file(path)))
            .collect();

        let mut block = Block::composite(self.name.clone(), self.compose, children);
        block.vars_mut().extend(self.vars.clone());
        block.with_var(SAMPLE_VAR, sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn library_with(files: &[(&str, &str)]) -> (tempfile::TempDir, Library) {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            let path = dir.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        let library = Library::new([dir.path()]);
        (dir, library)
    }

    #[test]
    fn test_block_for_sample() {
        let (_dir, library) = library_with(&[
            (
                "workflows/exome.yml",
                "tasks: [trim, align]\nvars:\n  reference: hg38.fa\n",
            ),
            ("tasks/trim.sh", "trim {{ sample }}\n"),
            ("tasks/align.sh", "bwa mem {{ reference }} {{ sample }}\n"),
        ]);

        let workflow = Workflow::load(&library, "exome").unwrap();
        let mut block = workflow.block_for("s1");
        assert_eq!(block.leaf_count(), 2);
        for (n, leaf) in block.leaves_mut().into_iter().enumerate() {
            leaf.set_log(format!("{n}.log"));
        }

        let out = block.render().unwrap();
        assert!(out.contains("trim s1"));
        assert!(out.contains("bwa mem hg38.fa s1"));
        assert!(out.find("trim").unwrap() < out.find("bwa").unwrap());
    }

    #[test]
    fn test_parallel_workflow() {
        let (_dir, library) = library_with(&[
            ("workflows/qc.yaml", "compose: parallel\ntasks: [a, b]\n"),
            ("tasks/a.sh", "a"),
            ("tasks/b.sh", "b"),
        ]);
        let workflow = Workflow::load(&library, "qc").unwrap();
        assert!(matches!(
            workflow.block_for("s1"),
            Block::Composite(ref c) if c.composition() == Composition::Parallel
        ));
    }

    #[test]
    fn test_missing_task() {
        let (_dir, library) = library_with(&[("workflows/w.yml", "tasks: [nope]\n")]);
        let err = Workflow::load(&library, "w").unwrap_err();
        assert!(matches!(err, WorkflowError::TaskNotFound { ref task, .. } if task == "nope"));
    }

    #[test]
    fn test_missing_workflow() {
        let (_dir, library) = library_with(&[]);
        assert!(matches!(
            Workflow::load(&library, "w"),
            Err(WorkflowError::NotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_definitions() {
        let (_dir, library) = library_with(&[
            ("workflows/empty.yml", "tasks: []\n"),
            ("workflows/typo.yml", "taks: [a]\n"),
        ]);
        assert!(matches!(
            Workflow::load(&library, "empty"),
            Err(WorkflowError::Empty { .. })
        ));
        assert!(matches!(
            Workflow::load(&library, "typo"),
            Err(WorkflowError::Parse { .. })
        ));
    }
}
