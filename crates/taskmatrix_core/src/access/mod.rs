//! Role-based task visibility.

pub mod scope;
