pub mod refcounted;
pub mod reader_pool;
