pub mod async_task;
pub mod convert;
pub mod file_io;
pub mod time;
