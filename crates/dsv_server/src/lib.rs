//! REST surface for data set versioning.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod principal;
pub mod router;
