//! Runbox - synchronous untrusted-code execution worker.
//!
//! Takes a source snippet plus optional stdin, runs it as an isolated child
//! process inside an ephemeral workspace under a hard wall-clock budget,
//! sanitizes the captured output, classifies the outcome into a fixed
//! verdict taxonomy, and records best-effort aggregate metrics.

pub mod engine;
pub mod http_server;
pub mod metrics;
pub mod state;
