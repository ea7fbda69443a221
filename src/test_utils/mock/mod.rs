mod mock_sysdb_server;

pub use mock_sysdb_server::*;
