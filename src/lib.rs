pub mod aggregate;
pub mod archive;
pub mod batch;
pub mod config;
pub mod dedup;
pub mod elevation;
pub mod error;
pub mod fetch;
pub mod integrity;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod types;
