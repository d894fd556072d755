//! h2engine - HTTP/2 protocol engine
//!
//! This crate provides the core of a draft-era (`h2-10`) HTTP/2 client and
//! server: the binary framing layer, the per-stream state machine, the
//! flow-control window arithmetic and a threaded connection multiplexer
//! built on top of them.

pub mod http;
pub mod net;
