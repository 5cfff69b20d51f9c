//! Continuous-deployment progression

pub mod release;
pub mod resolver;
