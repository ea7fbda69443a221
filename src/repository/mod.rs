mod log_repository;

#[cfg(test)]
mod log_repository_test;

pub use log_repository::*;
