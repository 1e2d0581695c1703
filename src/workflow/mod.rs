pub mod executor;
pub mod run;

pub use executor::{AdvanceAllSummary, AdvanceOutcome, Executor};
