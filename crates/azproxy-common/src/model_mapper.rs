use std::collections::BTreeMap;

use crate::config::ConfigError;

const DEFAULT_MAPPINGS: [(&str, &str); 2] = [
    ("gpt-3.5-turbo", "gpt-35-turbo"),
    ("gpt-3.5-turbo-0301", "gpt-35-turbo-0301"),
];

/// Maps OpenAI model identifiers onto Azure deployment names.
///
/// Unknown models fall back to the model name with every `.` and `:` removed,
/// which is how Azure deployments are usually named after the model they serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMapper {
    entries: BTreeMap<String, String>,
}

impl Default for ModelMapper {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ModelMapper {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut mapper = Self::empty();
        for (model, deployment) in DEFAULT_MAPPINGS {
            mapper.insert(model, deployment);
        }
        mapper
    }

    pub fn insert(&mut self, model: impl Into<String>, deployment: impl Into<String>) {
        self.entries.insert(model.into(), deployment.into());
    }

    /// Parses `model=deployment` pairs separated by commas.
    ///
    /// Every pair must split into exactly two parts on `=`, otherwise the whole value
    /// is rejected.
    pub fn parse_overrides(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
        raw.split(',')
            .map(|pair| {
                let parts: Vec<&str> = pair.split('=').collect();
                match parts.as_slice() {
                    [model, deployment] => {
                        Ok((model.trim().to_string(), deployment.trim().to_string()))
                    }
                    _ => Err(ConfigError::InvalidModelMapper(pair.to_string())),
                }
            })
            .collect()
    }

    pub fn apply_overrides(&mut self, raw: &str) -> Result<(), ConfigError> {
        for (model, deployment) in Self::parse_overrides(raw)? {
            self.insert(model, deployment);
        }
        Ok(())
    }

    pub fn resolve_deployment(&self, model: &str) -> String {
        if let Some(deployment) = self.entries.get(model) {
            return deployment.clone();
        }
        model.chars().filter(|c| !matches!(c, '.' | ':')).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(model, deployment)| (model.as_str(), deployment.as_str()))
    }
}
