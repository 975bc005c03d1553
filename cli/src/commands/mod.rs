//! Command implementations

pub mod run;
pub mod validate;
pub mod version;
