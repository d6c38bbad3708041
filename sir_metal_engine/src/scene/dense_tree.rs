/// DenseTree - world hierarchy stored as a flat array of nodes.
///
/// Nodes link to each other by array index. Structural edits (new nodes,
/// re-parenting) clear the sorted flag; `depth_first_sort` then rewrites the
/// array in depth-first order so that every parent sits before its children
/// and each subtree is contiguous.

use crate::error::Result;
use crate::engine_bail;

/// One node of a `DenseTree`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseTreeNode {
    /// Caller-side identifier (entity id, scene object id, ...)
    pub id: u32,
    /// Position of this node in the tree's node array
    pub index: usize,
    /// `None` only for the root
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug)]
pub struct DenseTree {
    nodes: Vec<DenseTreeNode>,
    root: Option<usize>,
    is_sorted: bool,
}

impl DenseTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            is_sorted: true,
        }
    }

    /// Create the root node; a tree has exactly one
    pub fn create_root(&mut self, id: u32) -> Result<usize> {
        if let Some(root) = self.root {
            engine_bail!(InvalidOperation => "sirmetal::DenseTree",
                "Tree already has a root (node {}, id {})", root, self.nodes[root].id);
        }
        let index = self.push_node(id, None);
        self.root = Some(index);
        Ok(index)
    }

    /// Create a node under `parent`
    pub fn create_node(&mut self, parent: usize, id: u32) -> Result<usize> {
        self.check_index(parent)?;
        let index = self.push_node(id, Some(parent));
        self.nodes[parent].children.push(index);
        Ok(index)
    }

    /// Attach `child` (and its subtree) under `parent`
    ///
    /// The child is first removed from its former parent's children.
    /// Moving the root, or moving a node under its own subtree, is rejected.
    pub fn parent_node(&mut self, parent: usize, child: usize) -> Result<()> {
        self.check_index(parent)?;
        self.check_index(child)?;
        if self.root == Some(child) {
            engine_bail!(InvalidOperation => "sirmetal::DenseTree", "Cannot re-parent the root node");
        }
        if self.is_ancestor_or_self(child, parent) {
            engine_bail!(InvalidOperation => "sirmetal::DenseTree",
                "Parenting node {} under {} would create a cycle", child, parent);
        }
        if self.nodes[child].parent == Some(parent) {
            return Ok(());
        }

        if let Some(old_parent) = self.nodes[child].parent {
            let siblings = &mut self.nodes[old_parent].children;
            if let Some(position) = siblings.iter().position(|&c| c == child) {
                siblings.swap_remove(position);
            }
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        self.is_sorted = false;
        Ok(())
    }

    /// Whether `child` is directly under `parent`
    pub fn is_direct_child(&self, parent: usize, child: usize) -> bool {
        self.nodes.get(child).is_some_and(|node| node.parent == Some(parent))
    }

    /// Reorder the node array depth-first from the root
    ///
    /// Children are visited in the order of their parent's child list.
    /// Does nothing when the tree is already sorted.
    pub fn depth_first_sort(&mut self) {
        if self.is_sorted {
            return;
        }
        let Some(root) = self.root else {
            self.is_sorted = true;
            return;
        };

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.nodes[index].children.iter().rev());
        }
        debug_assert_eq!(order.len(), self.nodes.len(), "unreachable nodes in dense tree");

        let mut new_index = vec![0usize; self.nodes.len()];
        for (position, &old) in order.iter().enumerate() {
            new_index[old] = position;
        }

        let mut old_nodes: Vec<Option<DenseTreeNode>> = self.nodes.drain(..).map(Some).collect();
        for (position, &old) in order.iter().enumerate() {
            if let Some(mut node) = old_nodes[old].take() {
                node.index = position;
                node.parent = node.parent.map(|p| new_index[p]);
                for c in node.children.iter_mut() {
                    *c = new_index[*c];
                }
                self.nodes.push(node);
            }
        }
        self.root = Some(new_index[root]);
        self.is_sorted = true;
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    pub fn node(&self, index: usize) -> Option<&DenseTreeNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[DenseTreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.is_sorted
    }

    /// Index of the first node carrying `id`
    pub fn find_by_id(&self, id: u32) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }

    fn push_node(&mut self, id: u32, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(DenseTreeNode {
            id,
            index,
            parent,
            children: Vec::new(),
        });
        self.is_sorted = false;
        index
    }

    /// Walk up from `node`; true if `ancestor` is met
    fn is_ancestor_or_self(&self, ancestor: usize, node: usize) -> bool {
        let mut current = Some(node);
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.nodes[index].parent;
        }
        false
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.nodes.len() {
            engine_bail!(InvalidOperation => "sirmetal::DenseTree",
                "Node index {} out of range ({} nodes)", index, self.nodes.len());
        }
        Ok(())
    }
}

impl Default for DenseTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "dense_tree_tests.rs"]
mod tests;
