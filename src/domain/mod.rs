//! Tool definitions and the registry that dispatches to them

pub mod registry;
pub mod tools;
