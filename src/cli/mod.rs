//! CLI argument parsing

pub mod args;

pub use args::{Args, Command, DefsArgs, ExecutionArgs, LoadArgs, PlanArgs, ProfileArgs, RunArgs, SelectionArgs};
