//! Hierarchical, addressable tree of build actions.
//!
//! Leaves are closures taking the progress [`Log`]. Nodes hold an ordered
//! list of children. Any node or leaf is addressable by the slash-separated
//! names leading to it from the root:
//!
//! ```text
//! all
//!   shared
//!     binutils
//!       unpack
//!       configure
//!       build
//!       install
//!   split
//!     ...
//! ```
//!
//! Execution is sequential and depth-first in declared order. Every selected
//! leaf is logged as `pending` before the first one starts. The first
//! failing leaf aborts the run; its error is returned wrapped with the leaf's
//! full path.

use std::fmt;
use std::time::Instant;

use anyhow::Result;

use crate::error::BuildError;
use crate::log::Log;

type LeafFn = Box<dyn Fn(&Log) -> Result<()>>;

/// A named unit of work.
pub struct Action {
    name: String,
    run: LeafFn,
}

impl Action {
    pub fn new(name: impl Into<String>, run: impl Fn(&Log) -> Result<()> + 'static) -> Result<Self> {
        let name = validate_name(name.into())?;
        Ok(Self {
            name,
            run: Box::new(run),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub enum ActionItem {
    Leaf(Action),
    Node(ActionNode),
}

impl ActionItem {
    pub fn name(&self) -> &str {
        match self {
            ActionItem::Leaf(action) => action.name(),
            ActionItem::Node(node) => node.name(),
        }
    }
}

impl From<Action> for ActionItem {
    fn from(action: Action) -> Self {
        ActionItem::Leaf(action)
    }
}

impl From<ActionNode> for ActionItem {
    fn from(node: ActionNode) -> Self {
        ActionItem::Node(node)
    }
}

/// Named, ordered group of actions.
#[derive(Debug)]
pub struct ActionNode {
    name: String,
    children: Vec<ActionItem>,
}

/// Lifecycle of one leaf during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionState::Pending => write!(f, "pending"),
            ActionState::Running => write!(f, "running"),
            ActionState::Succeeded => write!(f, "succeeded"),
            ActionState::Failed => write!(f, "failed"),
        }
    }
}

impl ActionNode {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: validate_name(name.into())?,
            children: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a child. Names must be unique within a node.
    pub fn push(&mut self, child: impl Into<ActionItem>) -> Result<()> {
        let child = child.into();
        if self.children.iter().any(|c| c.name() == child.name()) {
            return Err(BuildError::DuplicateAction {
                parent: self.name.clone(),
                name: child.name().to_string(),
            }
            .into());
        }
        self.children.push(child);
        Ok(())
    }

    /// Builder form of [`ActionNode::push`].
    pub fn with(mut self, child: impl Into<ActionItem>) -> Result<Self> {
        self.push(child)?;
        Ok(self)
    }

    /// Append a leaf built from `run`.
    pub fn leaf(
        &mut self,
        name: impl Into<String>,
        run: impl Fn(&Log) -> Result<()> + 'static,
    ) -> Result<()> {
        self.push(Action::new(name, run)?)
    }

    /// Run every leaf under this node.
    pub fn run(&self, log: &Log) -> Result<()> {
        log_pending(&self.children, &self.name, log);
        run_node(self, &self.name, log)
    }

    /// Run the sub-tree at `path` (see [`ActionNode::find`]).
    pub fn run_path(&self, path: &str, log: &Log) -> Result<()> {
        let (full_path, item) = self.find(path)?;
        match item {
            Found::Root => self.run(log),
            Found::Item(ActionItem::Node(node)) => {
                log_pending(&node.children, &full_path, log);
                run_node(node, &full_path, log)
            }
            Found::Item(ActionItem::Leaf(action)) => {
                log.line(format_args!("{}: {}", full_path, ActionState::Pending));
                run_leaf(action, &full_path, log)
            }
        }
    }

    /// Whether `path` names a node or leaf in this tree.
    pub fn contains(&self, path: &str) -> bool {
        self.find(path).is_ok()
    }

    /// Resolve `path` to its full path and target.
    ///
    /// The path is looked up below this node first. If that fails and it
    /// starts with this node's own name, the rest is looked up instead, so
    /// `all/shared` and `shared` both work. An empty path selects this node.
    fn find(&self, path: &str) -> Result<(String, Found<'_>)> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let resolved = self.resolve(&segments).or_else(|| match segments.split_first() {
            Some((first, rest)) if *first == self.name => self.resolve(rest),
            _ => None,
        });
        resolved.ok_or_else(|| {
            BuildError::UnknownAction {
                path: path.to_string(),
            }
            .into()
        })
    }

    fn resolve(&self, segments: &[&str]) -> Option<(String, Found<'_>)> {
        let mut full_path = self.name.clone();
        let mut found = Found::Root;
        let mut children = self.children.as_slice();

        for segment in segments {
            // Leaves have no children, so a segment after a leaf never matches.
            let child = children.iter().find(|c| c.name() == *segment)?;
            children = match child {
                ActionItem::Node(node) => node.children.as_slice(),
                ActionItem::Leaf(_) => &[],
            };
            full_path.push('/');
            full_path.push_str(segment);
            found = Found::Item(child);
        }

        Some((full_path, found))
    }

    /// Every node and leaf path, depth-first in declared order, starting with this node.
    pub fn paths(&self) -> Vec<String> {
        let mut out = vec![self.name.clone()];
        collect_paths(&self.children, &self.name, &mut out);
        out
    }

    /// Indented tree of names, two spaces per level.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.name);
        out.push('\n');
        render_children(&self.children, 1, &mut out);
        out
    }
}

enum Found<'a> {
    Root,
    Item(&'a ActionItem),
}

fn validate_name(name: String) -> Result<String> {
    if name.is_empty() || name.contains('/') {
        return Err(BuildError::InvalidActionName { name }.into());
    }
    Ok(name)
}

fn log_pending(children: &[ActionItem], prefix: &str, log: &Log) {
    for child in children {
        let path = format!("{}/{}", prefix, child.name());
        match child {
            ActionItem::Leaf(_) => log.line(format_args!("{}: {}", path, ActionState::Pending)),
            ActionItem::Node(node) => log_pending(&node.children, &path, log),
        }
    }
}

fn run_node(node: &ActionNode, path: &str, log: &Log) -> Result<()> {
    for child in &node.children {
        let child_path = format!("{}/{}", path, child.name());
        match child {
            ActionItem::Leaf(action) => run_leaf(action, &child_path, log)?,
            ActionItem::Node(node) => run_node(node, &child_path, log)?,
        }
    }
    Ok(())
}

fn run_leaf(action: &Action, path: &str, log: &Log) -> Result<()> {
    log.line(format_args!("{}: {}", path, ActionState::Running));
    let start = Instant::now();

    match (action.run)(log) {
        Ok(()) => {
            log.line(format_args!(
                "{}: {} ({:.1}s)",
                path,
                ActionState::Succeeded,
                start.elapsed().as_secs_f64()
            ));
            Ok(())
        }
        Err(err) => {
            log.line(format_args!(
                "{}: {} ({:.1}s)",
                path,
                ActionState::Failed,
                start.elapsed().as_secs_f64()
            ));
            Err(err.context(format!("action '{}' failed", path)))
        }
    }
}

fn collect_paths(children: &[ActionItem], prefix: &str, out: &mut Vec<String>) {
    for child in children {
        let path = format!("{}/{}", prefix, child.name());
        out.push(path.clone());
        if let ActionItem::Node(node) = child {
            collect_paths(&node.children, &path, out);
        }
    }
}

fn render_children(children: &[ActionItem], depth: usize, out: &mut String) {
    for child in children {
        out.push_str(&"  ".repeat(depth));
        out.push_str(child.name());
        out.push('\n');
        if let ActionItem::Node(node) = child {
            render_children(&node.children, depth + 1, out);
        }
    }
}
