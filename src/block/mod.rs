//! Block trees
//!
//! A block tree describes one sample's workflow. Leaves are atomic commands
//! rendered from a template; composites combine their children's rendered
//! commands under a [`Composition`] rule.
//!
//! ```rust
//! use batchline::block::{Block, Template};
//!
//! let mut tree = Block::serial("align", vec![
//!     Block::leaf("trim", Template::inline("trim {{ sample }}")),
//!     Block::leaf("bwa", Template::inline("bwa mem {{ sample }}")),
//! ])
//! .with_var("sample", "s1");
//!
//! for (n, leaf) in tree.leaves_mut().into_iter().enumerate() {
//!     leaf.set_log(format!("/tmp/{}.log", n + 1));
//! }
//! let script = tree.render().unwrap();
//! assert!(script.contains("trim s1"));
//! ```

mod template;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use template::{Template, TemplateError, render};

/// Variable mapping used to render blocks
pub type Vars = BTreeMap<String, String>;

/// Variable every leaf must carry before it is rendered
pub const LOG_VAR: &str = "log";

/// Errors raised while rendering a block tree
#[derive(Error, Debug)]
pub enum BlockError {
    /// A leaf was rendered before a log path was assigned to it
    #[error("block '{block}' has no log path")]
    MissingLog {
        /// Identifier of the leaf block.
        block: String,
    },

    /// A leaf's template failed to render
    #[error("block '{block}': {source}")]
    Template {
        /// Identifier of the leaf block.
        block: String,
        /// Underlying template error.
        #[source]
        source: TemplateError,
    },
}

/// How a composite block combines its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Composition {
    /// Children run one after another
    #[default]
    Serial,
    /// Children run concurrently; the composite waits for all of them
    Parallel,
}

/// An atomic unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafBlock {
    id: String,
    template: Template,
    vars: Vars,
}

impl LeafBlock {
    /// Identifier recorded on the subtask created for this leaf
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Template producing this leaf's command
    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Variables local to this leaf
    #[must_use]
    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    /// Mutable access to the leaf's variables
    pub fn vars_mut(&mut self) -> &mut Vars {
        &mut self.vars
    }

    /// Log path the leaf's output is redirected to, once assigned
    #[must_use]
    pub fn log(&self) -> Option<&str> {
        self.vars.get(LOG_VAR).map(String::as_str)
    }

    /// Assigns the leaf's log path
    pub fn set_log(&mut self, path: impl Into<String>) {
        self.vars.insert(LOG_VAR.to_string(), path.into());
    }

    fn render_with(&self, scope: &Vars) -> Result<String, BlockError> {
        let log = self.log().ok_or_else(|| BlockError::MissingLog {
            block: self.id.clone(),
        })?;

        let mut merged = scope.clone();
        merged.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        let body = self
            .template
            .render(&merged)
            .map_err(|source| BlockError::Template {
                block: self.id.clone(),
                source,
            })?;

        Ok(format!(
            "# <{id}>\n(\n{body}\n) > {log} 2>&1\n# </{id}>",
            id = self.id,
            body = subshell_body(&body),
            log = shell_words::quote(log),
        ))
    }
}

/// Body placed inside `( ... )`
///
/// Bash rejects a subshell without commands, so text holding only blank
/// lines and comments gets a trailing `:`.
fn subshell_body(text: &str) -> String {
    let body = text.trim_end_matches('\n');
    let has_command = body.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    });
    match (has_command, body.is_empty()) {
        (true, _) => body.to_string(),
        (false, true) => ":".to_string(),
        (false, false) => format!("{body}\n:"),
    }
}

/// A combinator over child blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeBlock {
    id: String,
    composition: Composition,
    children: Vec<Block>,
    vars: Vars,
}

impl CompositeBlock {
    /// Identifier of the composite
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rule used to combine the children
    #[must_use]
    pub fn composition(&self) -> Composition {
        self.composition
    }

    /// Child blocks in order
    #[must_use]
    pub fn children(&self) -> &[Block] {
        &self.children
    }

    /// Variables visible to every descendant leaf
    #[must_use]
    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    fn render_with(&self, scope: &Vars) -> Result<String, BlockError> {
        let mut merged = scope.clone();
        merged.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        let commands = self
            .children
            .iter()
            .map(|child| child.render_with(&merged))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match self.composition {
            Composition::Serial => commands.join("\n\n"),
            Composition::Parallel if commands.is_empty() => String::new(),
            Composition::Parallel => {
                let mut out = commands
                    .iter()
                    .map(|cmd| format!("(\n{}\n) &", subshell_body(cmd)))
                    .collect::<Vec<_>>()
                    .join("\n");
                out.push_str("\nwait");
                out
            }
        })
    }
}

/// A node of a workflow tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Atomic command
    Leaf(LeafBlock),
    /// Combination of child blocks
    Composite(CompositeBlock),
}

impl Block {
    /// Creates a leaf block
    pub fn leaf(id: impl Into<String>, template: Template) -> Self {
        Self::Leaf(LeafBlock {
            id: id.into(),
            template,
            vars: Vars::new(),
        })
    }

    /// Creates a composite running `children` one after another
    pub fn serial(id: impl Into<String>, children: Vec<Block>) -> Self {
        Self::composite(id, Composition::Serial, children)
    }

    /// Creates a composite running `children` concurrently
    pub fn parallel(id: impl Into<String>, children: Vec<Block>) -> Self {
        Self::composite(id, Composition::Parallel, children)
    }

    /// Creates a composite with an explicit rule
    pub fn composite(id: impl Into<String>, composition: Composition, children: Vec<Block>) -> Self {
        Self::Composite(CompositeBlock {
            id: id.into(),
            composition,
            children,
            vars: Vars::new(),
        })
    }

    /// Sets a variable on this block
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars_mut().insert(key.into(), value.into());
        self
    }

    /// Block identifier
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Leaf(leaf) => &leaf.id,
            Self::Composite(composite) => &composite.id,
        }
    }

    /// Child blocks; empty for leaves
    #[must_use]
    pub fn children(&self) -> &[Block] {
        match self {
            Self::Leaf(_) => &[],
            Self::Composite(composite) => &composite.children,
        }
    }

    /// Variables set on this block
    #[must_use]
    pub fn vars(&self) -> &Vars {
        match self {
            Self::Leaf(leaf) => &leaf.vars,
            Self::Composite(composite) => &composite.vars,
        }
    }

    /// Mutable access to this block's variables
    pub fn vars_mut(&mut self) -> &mut Vars {
        match self {
            Self::Leaf(leaf) => &mut leaf.vars,
            Self::Composite(composite) => &mut composite.vars,
        }
    }

    /// Returns true for leaf blocks
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Number of leaves in the tree
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Composite(composite) => composite.children.iter().map(Self::leaf_count).sum(),
        }
    }

    /// Leaves in depth-first preorder
    pub fn leaves_mut(&mut self) -> Vec<&mut LeafBlock> {
        fn collect<'a>(block: &'a mut Block, out: &mut Vec<&'a mut LeafBlock>) {
            match block {
                Block::Leaf(leaf) => out.push(leaf),
                Block::Composite(composite) => {
                    for child in &mut composite.children {
                        collect(child, out);
                    }
                }
            }
        }

        let mut out = Vec::with_capacity(self.leaf_count());
        collect(self, &mut out);
        out
    }

    /// Reads every leaf's file template into memory
    ///
    /// # Errors
    ///
    /// Fails with [`BlockError::Template`] naming the first leaf whose file
    /// cannot be read.
    pub async fn load_templates(&mut self) -> Result<(), BlockError> {
        for leaf in self.leaves_mut() {
            leaf.template = leaf
                .template
                .load()
                .await
                .map_err(|source| BlockError::Template {
                    block: leaf.id.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Renders the block's command text
    ///
    /// # Errors
    ///
    /// Fails when a leaf has no log path or its template cannot be rendered.
    pub fn render(&self) -> Result<String, BlockError> {
        self.render_with(&Vars::new())
    }

    /// Renders the block with `scope` visible to every leaf
    ///
    /// Variables set on a block shadow the same keys in `scope`.
    ///
    /// # Errors
    ///
    /// Fails when a leaf has no log path or its template cannot be rendered.
    pub fn render_with(&self, scope: &Vars) -> Result<String, BlockError> {
        match self {
            Self::Leaf(leaf) => leaf.render_with(scope),
            Self::Composite(composite) => composite.render_with(scope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn leaf(id: &str, body: &str) -> Block {
        Block::leaf(id, Template::inline(body))
    }

    fn numbered(mut block: Block) -> Block {
        for (n, leaf) in block.leaves_mut().into_iter().enumerate() {
            leaf.set_log(format!("{}.log", n + 1));
        }
        block
    }

    #[test]
    fn test_leaf_requires_log() {
        let err = leaf("a", "echo a").render().unwrap_err();
        assert!(matches!(err, BlockError::MissingLog { ref block } if block == "a"));
    }

    #[test]
    fn test_leaf_render_wires_log() {
        let out = numbered(leaf("a", "echo a\n")).render().unwrap();
        assert_eq!(out, "# <a>\n(\necho a\n) > 1.log 2>&1\n# </a>");
    }

    #[test]
    fn test_leaf_log_is_quoted() {
        let mut block = leaf("a", "true");
        if let Block::Leaf(l) = &mut block {
            l.set_log("/data/my run/1.log");
        }
        let out = block.render().unwrap();
        assert!(out.contains("> '/data/my run/1.log' 2>&1"));
    }

    #[test]
    fn test_serial_preserves_order() {
        let tree = numbered(Block::serial("s", vec![leaf("a", "echo a"), leaf("b", "echo b")]));
        let out = tree.render().unwrap();
        let a = out.find("echo a").unwrap();
        let b = out.find("echo b").unwrap();
        assert!(a < b);
        assert!(!out.contains("wait"));
    }

    #[test]
    fn test_parallel_waits() {
        let tree = numbered(Block::parallel("p", vec![leaf("a", "echo a"), leaf("b", "echo b")]));
        let out = tree.render().unwrap();
        assert_eq!(out.matches(") &").count(), 2);
        assert!(out.ends_with("\nwait"));
    }

    #[test]
    fn test_composite_vars_are_scope() {
        let tree = numbered(
            Block::serial(
                "s",
                vec![leaf("a", "echo {{ sample }}"), leaf("b", "echo {{ sample }}").with_var("sample", "own")],
            )
            .with_var("sample", "s1"),
        );
        let out = tree.render().unwrap();
        assert!(out.contains("echo s1"));
        assert!(out.contains("echo own"));
        assert_eq!(tree.vars().get("sample").map(String::as_str), Some("s1"));
    }

    #[test]
    fn test_leaves_mut_preorder() {
        let mut tree = Block::serial(
            "root",
            vec![
                leaf("a", ""),
                Block::parallel("p", vec![leaf("b", ""), Block::serial("s", vec![leaf("c", "")])]),
                leaf("d", ""),
            ],
        );
        let ids: Vec<_> = tree.leaves_mut().iter().map(|l| l.id().to_string()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn test_empty_composite_renders_nothing() {
        let tree = Block::serial("empty", Vec::new());
        assert_eq!(tree.leaf_count(), 0);
        assert_eq!(tree.render().unwrap(), "");
        assert_eq!(Block::parallel("empty", Vec::new()).render().unwrap(), "");
    }

    #[test]
    fn test_commentless_leaf_gets_noop() {
        let out = numbered(leaf("todo", "# nothing yet\n")).render().unwrap();
        assert_eq!(out, "# <todo>\n(\n# nothing yet\n:\n) > 1.log 2>&1\n# </todo>");

        let out = numbered(leaf("blank", "")).render().unwrap();
        assert_eq!(out, "# <blank>\n(\n:\n) > 1.log 2>&1\n# </blank>");
    }

    #[test]
    fn test_empty_child_of_parallel_gets_noop() {
        let tree = numbered(Block::parallel("p", vec![Block::serial("none", Vec::new()), leaf("a", "echo a")]));
        let out = tree.render().unwrap();
        assert!(out.starts_with("(\n:\n) &\n"));
        assert!(out.ends_with("\nwait"));
    }

    #[cfg(unix)]
    #[test]
    fn test_rendered_tree_parses_in_bash() {
        let tree = numbered(Block::serial(
            "root",
            vec![
                leaf("todo", "# nothing yet\n"),
                Block::parallel("p", vec![Block::serial("none", Vec::new()), leaf("b", "")]),
                leaf("real", "echo real"),
            ],
        ));
        let script = tree.render().unwrap();
        let status = std::process::Command::new("bash")
            .args(["-n", "-c", &script])
            .status()
            .unwrap();
        assert!(status.success(), "bash rejected:\n{script}");
    }

    #[tokio::test]
    async fn test_load_templates_inlines_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trim.sh");
        std::fs::write(&path, "trim {{ sample }}").unwrap();

        let mut tree = Block::serial("s", vec![Block::leaf("trim", Template::file(&path)), leaf("b", "echo b")]);
        tree.load_templates().await.unwrap();
        let templates: Vec<_> = tree.leaves_mut().iter().map(|l| l.template().clone()).collect();
        assert_eq!(templates, [Template::inline("trim {{ sample }}"), Template::inline("echo b")]);

        let mut broken = Block::leaf("gone", Template::file(dir.path().join("gone.sh")));
        let err = broken.load_templates().await.unwrap_err();
        assert!(matches!(err, BlockError::Template { ref block, .. } if block == "gone"));
    }

    #[test]
    fn test_template_error_names_block() {
        let err = numbered(leaf("a", "{{ nope }}")).render().unwrap_err();
        assert!(err.to_string().contains("block 'a'"));
    }
}
