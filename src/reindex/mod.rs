pub mod source;
pub mod reindexer;
