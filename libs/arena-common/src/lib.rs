pub mod config;
pub mod types;

// Re-export commonly used types for convenience
pub use config::Config;
pub use types::{
    ActualOutput, ExecutionOutcome, ExecutionReport, ExecutionRequest, LanguageSpec, RunResult,
    TestCase, TestCaseResult,
};
