//! Network layer: the tonic server exposing LogService.
//!
//! The registry client lives with the other [`crate::SysDb`] implementations.

pub(crate) mod grpc;
