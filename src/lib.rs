//! Client-side caching for the job application tracker: the persisted job
//! collection, company logo resolution, and the sync loop that ties them to
//! the tracker view.

pub mod api;
pub mod cache;
pub mod config;
pub mod jobs;
pub mod logging;
pub mod logos;
pub mod sync;
