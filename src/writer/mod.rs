pub mod write_lock;
