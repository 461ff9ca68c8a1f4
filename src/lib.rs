//! storegate: API gateway for the store services with a cache-aside
//! response cache in front of selected routes.

pub mod cache;
pub mod config;
pub mod error;
pub mod infra;
