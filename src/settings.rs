//! Deployment settings
//!
//! Settings are resolved once from environment-style key/value pairs and then
//! passed by reference to everything that needs them. Front ends layer their
//! own overrides on top with [`SettingsOverrides`].

use serde::{Deserialize, Serialize};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_DATABASE: &str = "super_store_data";
pub const DEFAULT_CATALOG: &str = "AwsDataCatalog";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Athena routing parameters for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AthenaSettings {
    pub region: String,
    pub database: String,
    pub workgroup: Option<String>,
    pub catalog: String,
    pub output: Option<String>,
}

impl AthenaSettings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            region: get("AWS_REGION")
                .or_else(|| get("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            database: get("ATHENA_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            workgroup: get("ATHENA_WORKGROUP"),
            catalog: get("ATHENA_CATALOG").unwrap_or_else(|| DEFAULT_CATALOG.to_string()),
            output: get("ATHENA_OUTPUT"),
        }
    }

    /// Key/value view of the settings, in the environment naming.
    pub fn to_env_pairs(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("AWS_REGION", Some(self.region.clone())),
            ("AWS_DEFAULT_REGION", Some(self.region.clone())),
            ("ATHENA_DATABASE", Some(self.database.clone())),
            ("ATHENA_WORKGROUP", self.workgroup.clone()),
            ("ATHENA_CATALOG", Some(self.catalog.clone())),
            ("ATHENA_OUTPUT", self.output.clone()),
        ]
    }
}

/// Connection parameters for the chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl LlmSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            model: get("INSIGHT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

/// Values entered by the user in a front end. `None` keeps the resolved value;
/// an empty string clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub region: Option<String>,
    pub database: Option<String>,
    pub workgroup: Option<String>,
    pub catalog: Option<String>,
    pub output: Option<String>,
    pub model: Option<String>,
}

impl SettingsOverrides {
    pub fn apply(&self, athena: &mut AthenaSettings, llm: &mut LlmSettings) {
        if let Some(region) = &self.region {
            athena.region = region.trim().to_string();
        }
        if let Some(database) = &self.database {
            athena.database = database.trim().to_string();
        }
        if let Some(catalog) = &self.catalog {
            athena.catalog = catalog.trim().to_string();
        }
        if let Some(workgroup) = &self.workgroup {
            athena.workgroup = non_empty(workgroup);
        }
        if let Some(output) = &self.output {
            athena.output = non_empty(output);
        }
        if let Some(model) = self.model.as_deref().and_then(non_empty) {
            llm.model = model;
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let settings = AthenaSettings::from_lookup(lookup(&[]));
        assert_eq!(settings.region, "us-east-1");
        assert_eq!(settings.database, "super_store_data");
        assert_eq!(settings.catalog, "AwsDataCatalog");
        assert_eq!(settings.workgroup, None);
        assert_eq!(settings.output, None);
    }

    #[test]
    fn test_region_falls_back_to_default_region_variable() {
        let settings = AthenaSettings::from_lookup(lookup(&[
            ("AWS_REGION", ""),
            ("AWS_DEFAULT_REGION", "eu-west-1"),
        ]));
        assert_eq!(settings.region, "eu-west-1");
    }

    #[test]
    fn test_overrides_replace_and_clear() {
        let mut athena = AthenaSettings::from_lookup(lookup(&[
            ("ATHENA_WORKGROUP", "primary"),
            ("ATHENA_OUTPUT", "s3://bucket/out/"),
        ]));
        let mut llm = LlmSettings::from_lookup(lookup(&[]));
        let overrides = SettingsOverrides {
            database: Some("sales".to_string()),
            workgroup: Some("  ".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            ..Default::default()
        };

        overrides.apply(&mut athena, &mut llm);

        assert_eq!(athena.database, "sales");
        assert_eq!(athena.workgroup, None);
        assert_eq!(athena.output.as_deref(), Some("s3://bucket/out/"));
        assert_eq!(llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_llm_base_url_trailing_slash_trimmed() {
        let llm = LlmSettings::from_lookup(lookup(&[("OPENAI_BASE_URL", "http://localhost:11434/v1/")]));
        assert_eq!(llm.base_url, "http://localhost:11434/v1");
        assert_eq!(llm.api_key, None);
    }
}
