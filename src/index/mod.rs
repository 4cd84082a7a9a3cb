pub mod term;
pub mod segment_cache;
pub mod index_writer;
pub mod index_reader;
pub mod check;
