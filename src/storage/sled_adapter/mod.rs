mod sled_log_store;


pub use sled_log_store::*;
