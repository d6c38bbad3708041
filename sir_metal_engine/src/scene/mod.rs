//! Scene module
//!
//! World hierarchy storage.

pub mod dense_tree;

pub use dense_tree::{DenseTree, DenseTreeNode};
