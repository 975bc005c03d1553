//! Application services — use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`, never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod case_run;
pub mod engine_check;
pub mod executor;
pub mod extractor;
pub mod teardown;
pub mod validation;
