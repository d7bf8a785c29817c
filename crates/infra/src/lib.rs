//! Infrastructure layer: repositories, cache, object storage, background
//! jobs, the upload pipeline and process configuration.

pub mod cache;
pub mod config;
pub mod jobs;
pub mod realtime;
pub mod repo;
pub mod storage;
pub mod upload;
