pub mod collect;
pub mod logical;
pub mod package;
pub mod xml;
