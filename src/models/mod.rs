//! Definition records consumed by the engine

pub mod check;
pub mod types;

pub use check::{CheckType, Operator, ResponseCheck};
pub use types::{Endpoint, HeadersDict, Phase, Scenario, ScenarioStep, Template, TestCase, VarExprMap};
