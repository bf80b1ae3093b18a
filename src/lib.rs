//! pulserun library interface
//!
//! Orchestrates HTTP functional and load test runs from stored definitions.
//!
//! # Module Organization
//!
//! - [`variables`] - Built-in generators and custom converters
//! - [`context`] - Run context (values captured between requests)
//! - [`template`] - Template rendering and request materialization
//! - [`pipeline`] - Dependency expansion, checks, execution and reports
//! - [`load`] - Load profiles, injection schedules and the virtual-user driver
//! - [`store`] - Definition store
//! - [`transport`] - HTTP transport
//! - [`signals`] - Interrupt handling (was_interrupted, set_interrupted)
//! - [`errors`] - Error types (PulserunError, Result)
//! - [`status`] - Exit status codes (ExitStatus)
//! - [`core`] - CLI execution logic

pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod load;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod signals;
pub mod status;
pub mod store;
pub mod table;
pub mod template;
pub mod transport;
pub mod variables;
