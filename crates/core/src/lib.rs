//! Pure domain logic for the video-generation worker.
//!
//! Everything in this crate is synchronous and I/O-free so it can be
//! tested in isolation: the resolution planner, the job model and its
//! validation rules, and the shared error type.

pub mod error;
pub mod job;
pub mod resolution;
pub mod types;
