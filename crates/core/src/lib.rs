pub mod intent;
pub mod models;
pub mod planner;
pub mod sanitize;

pub use intent::extract;
pub use models::*;
pub use planner::build_mock_plan;
pub use sanitize::{sanitize_intent, sanitize_plan, strip_code_fence, BudgetField};
