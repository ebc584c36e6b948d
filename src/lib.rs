//! uprising - will you survive the robot uprising?
//!
//! A single-endpoint service that asks a generative model for a snarky
//! survival verdict per username, stores the first answer, and replays it
//! for every later request.

pub mod api;
pub mod config;
pub mod error;
pub mod gemini;
pub mod models;
pub mod prompt;
pub mod rate_limiter;
pub mod sanitize;
pub mod service;
pub mod store;
