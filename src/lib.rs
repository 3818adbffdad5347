// src/lib.rs — Library root for harmony-agent

pub mod api;
pub mod cli;
pub mod core;
pub mod infra;
pub mod runtime;
pub mod tracking;
