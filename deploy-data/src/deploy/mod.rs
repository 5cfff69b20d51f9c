//! Deployment module

pub mod executor;
pub mod fsm;
pub mod package_manager;
pub mod version;
