//! Deployment data model

pub mod artifact;
pub mod auto_deploy;
pub mod de;
pub mod deployment;
pub mod operation;
pub mod package;
pub mod quality;
pub mod rrc;
