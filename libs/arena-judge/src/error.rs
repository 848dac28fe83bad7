use thiserror::Error;

/// Failures of the verification pipeline
///
/// `UnsupportedLanguage`, `HarnessGeneration` and `RegistryConfig` abort a
/// whole run. Engine errors and parse errors are scoped to a single test case
/// and end up inline in its result.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Language {0} not supported")]
    UnsupportedLanguage(String),

    #[error("Source code too large: {size} bytes (max {limit})")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("Cannot build harness for {language}: {reason}")]
    HarnessGeneration { language: String, reason: String },

    #[error("Execution engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Execution engine timed out: {0}")]
    EngineTimeout(String),

    #[error("Result line is not valid JSON: {0}")]
    ResultParse(String),

    #[error("Invalid language configuration: {0}")]
    RegistryConfig(String),
}

impl JudgeError {
    pub fn harness(language: impl Into<String>, reason: impl Into<String>) -> Self {
        JudgeError::HarnessGeneration {
            language: language.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error ends the whole run rather than one test case
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JudgeError::UnsupportedLanguage(_)
                | JudgeError::SourceTooLarge { .. }
                | JudgeError::HarnessGeneration { .. }
                | JudgeError::RegistryConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, JudgeError>;
