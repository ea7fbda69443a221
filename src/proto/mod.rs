//! Protocol Buffer definitions and generated code for RPC services.
//!
//! Generated at build time by [`tonic-build`] from `proto/`.

pub mod log {
    tonic::include_proto!("chroma.log");
}

pub mod sysdb {
    tonic::include_proto!("chroma.sysdb");
}
