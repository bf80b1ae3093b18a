//! Run-scoped state shared between executed items

pub mod run_context;

pub use run_context::RunContext;
