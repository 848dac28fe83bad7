pub mod cache;
pub mod client;
pub mod error;
pub mod formatter;
pub mod harness;
pub mod normalize;
pub mod registry;
pub mod runner;

pub use cache::{Clock, ExpiringCache, SystemClock};
pub use client::{EngineRuntime, ExecutionClient, PistonClient};
pub use error::{JudgeError, Result};
pub use formatter::{summarize, DisplayConfig, RunStatus, Summary};
pub use harness::{HarnessGenerator, HarnessStrategy};
pub use registry::LanguageRegistry;
pub use runner::{RunnerOptions, TestRunner};
