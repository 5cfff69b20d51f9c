//! Deployment data library
//!
//! Deployment record state machine and continuous-deployment progression
//! for AEM content package pipelines. Each pipeline step runs one stage
//! against the record persisted by the previous step.

pub mod app;
pub mod decision;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod outputs;
pub mod progression;
pub mod quality;
pub mod stages;
pub mod storage;
pub mod utils;
