pub mod output;
pub mod planner;
