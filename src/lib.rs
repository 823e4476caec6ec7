#![forbid(unsafe_code)]

pub mod build;
pub mod cli;
pub mod context;
pub mod fetch;
pub mod file_store;
pub mod formats;
pub mod identity;
pub mod images;
pub mod logging;
pub mod manifest;
pub mod markdown;
pub mod nav;
pub mod reconcile;
pub mod source;
pub mod sync;
