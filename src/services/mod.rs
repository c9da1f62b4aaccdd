//! Streaming core: catalog, storage access, range parsing, chunked transfer,
//! response framing, and upload ingest.

pub mod catalog;
pub mod framer;
pub mod ingest;
pub mod range;
pub mod storage_service;
pub mod transfer;
