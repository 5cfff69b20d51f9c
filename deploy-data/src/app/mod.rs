//! Application entry: environment, options and stage dispatch

pub mod env;
pub mod options;
pub mod run;
