pub mod engine;
pub mod options;

pub use engine::QueryEngine;
pub use options::{ColumnCondition, FindOptions, JoinTarget, QueryPlan, QuerySpec, Through};
