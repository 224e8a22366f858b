//! Types shared between the RiSSA backend and its clients.
//!
//! Everything here is plain serde data: the engine lives in `backend`.

pub mod jobs;
pub mod model;
pub mod requests;
