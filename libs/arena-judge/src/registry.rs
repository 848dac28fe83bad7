// Language registry
// Loads the supported languages from languages.json, or falls back to the built-in table

use crate::error::{JudgeError, Result};
use arena_common::LanguageSpec;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// (name, engine language, engine version, source filename)
const BUILTIN_LANGUAGES: &[(&str, &str, &str, &str)] = &[
    ("javascript", "javascript", "18.15.0", "solution.js"),
    ("python", "python", "3.10.0", "solution.py"),
    ("java", "java", "15.0.2", "Main.java"),
    ("cpp", "cpp", "10.2.0", "solution.cpp"),
    ("c", "c", "10.2.0", "solution.c"),
    ("typescript", "typescript", "5.0.3", "solution.ts"),
    ("rust", "rust", "1.68.2", "solution.rs"),
    ("go", "go", "1.16.2", "solution.go"),
];

#[derive(Debug, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageSpec>,
}

/// Registry of configured languages
///
/// Built once at startup and shared read-only afterwards; lookups are by
/// name or alias, case-insensitive.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    specs: Vec<LanguageSpec>,
    index: HashMap<String, usize>,
}

impl LanguageRegistry {
    /// Build a registry from explicit entries
    pub fn from_specs(specs: Vec<LanguageSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(JudgeError::RegistryConfig(
                "no languages configured".to_string(),
            ));
        }

        let mut index = HashMap::new();
        for (position, spec) in specs.iter().enumerate() {
            for key in std::iter::once(&spec.name).chain(spec.aliases.iter()) {
                let key = key.trim().to_lowercase();
                if index.insert(key.clone(), position).is_some() {
                    return Err(JudgeError::RegistryConfig(format!(
                        "language name or alias '{}' is declared twice",
                        key
                    )));
                }
            }
        }

        Ok(Self { specs, index })
    }

    /// The languages the platform has always shipped with
    pub fn builtin() -> Self {
        let specs = BUILTIN_LANGUAGES
            .iter()
            .map(|(name, engine_language, engine_version, filename)| LanguageSpec {
                name: name.to_string(),
                engine_language: engine_language.to_string(),
                engine_version: engine_version.to_string(),
                source_filename: filename.to_string(),
                aliases: match *name {
                    "javascript" => vec!["js".to_string(), "node".to_string()],
                    "python" => vec!["py".to_string(), "python3".to_string()],
                    "typescript" => vec!["ts".to_string()],
                    "cpp" => vec!["c++".to_string()],
                    _ => Vec::new(),
                },
            })
            .collect();

        Self::from_specs(specs).unwrap_or_else(|_| unreachable!("builtin table is valid"))
    }

    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path).map_err(|e| {
            JudgeError::RegistryConfig(format!(
                "failed to read {}: {}",
                config_path.display(),
                e
            ))
        })?;

        let languages_json: LanguagesJson = serde_json::from_str(&content).map_err(|e| {
            JudgeError::RegistryConfig(format!(
                "failed to parse {}: {}",
                config_path.display(),
                e
            ))
        })?;

        Self::from_specs(languages_json.languages)
    }

    /// Load from `config_path` when it exists, otherwise use the built-in table
    pub fn load_or_builtin(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let registry = Self::load(config_path)?;
            info!(
                path = %config_path.display(),
                languages = ?registry.names(),
                "Loaded language configuration"
            );
            Ok(registry)
        } else {
            debug!(path = %config_path.display(), "Language config not found, using built-in table");
            Ok(Self::builtin())
        }
    }

    /// Resolve a language by name or alias
    pub fn resolve(&self, name: &str) -> Result<&LanguageSpec> {
        self.index
            .get(&name.trim().to_lowercase())
            .map(|&position| &self.specs[position])
            .ok_or_else(|| JudgeError::UnsupportedLanguage(name.to_string()))
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// All registered languages, in declaration order
    pub fn languages(&self) -> &[LanguageSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
