use std::path::Path;

use anyhow::{Context, bail};

use crate::Config;

/// Load and validate a configuration file.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration from {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse configuration from {}", path.display()))?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> anyhow::Result<()> {
    for binding in &config.bindings {
        if !config.models.iter().any(|m| m.id == binding.model_id) {
            bail!(
                "binding {} references unknown model id {}",
                binding.id,
                binding.model_id
            );
        }

        if !config.providers.iter().any(|p| p.id == binding.provider_id) {
            bail!(
                "binding {} references unknown provider id {}",
                binding.id,
                binding.provider_id
            );
        }

        if binding.weight < 0 {
            bail!("binding {} has a negative weight", binding.id);
        }
    }

    let mut seen = std::collections::BTreeSet::new();

    for binding in &config.bindings {
        let key = (binding.model_id, binding.provider_id, binding.provider_model.as_str());

        if !seen.insert(key) {
            bail!(
                "duplicate binding for model {} / provider {} / '{}'",
                binding.model_id,
                binding.provider_id,
                binding.provider_model
            );
        }
    }

    for dialect in config.providers.iter().map(|p| p.dialect.as_str()) {
        if !matches!(dialect, "openai-chat" | "openai-responses" | "anthropic") {
            bail!("unknown provider dialect '{dialect}'");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn parse(toml: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(toml)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn parses_full_catalog() {
        let config = parse(indoc! {r#"
            [server]
            listen_address = "127.0.0.1:7070"

            [settings]
            auto_weight_decay = true
            auto_weight_decay_step = 2

            [[providers]]
            id = 1
            name = "openai-main"
            dialect = "openai-chat"
            api_key = "sk-test"

            [[models]]
            id = 1
            name = "gpt-4o"
            max_retry = 2

            [[bindings]]
            id = 1
            model_id = 1
            provider_id = 1
            provider_model = "gpt-4o-2024-08-06"
            weight = 5
            capabilities = { tool_call = true, image = true }
        "#})
        .expect("valid config");

        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.models[0].max_retry, 2);
        assert_eq!(config.bindings[0].weight, 5);
        assert!(config.bindings[0].capabilities.tool_call);
        assert!(!config.bindings[0].capabilities.structured_output);
        assert_eq!(config.settings.auto_weight_decay_step, 2);
    }

    #[test]
    fn rejects_dangling_binding() {
        let error = parse(indoc! {r#"
            [[providers]]
            id = 1
            name = "openai"
            dialect = "openai-chat"
            api_key = "sk-test"

            [[bindings]]
            id = 1
            model_id = 42
            provider_id = 1
            provider_model = "gpt-4o"
        "#})
        .expect_err("binding references missing model");

        assert!(error.to_string().contains("unknown model id 42"));
    }

    #[test]
    fn rejects_duplicate_binding_triple() {
        let error = parse(indoc! {r#"
            [[providers]]
            id = 1
            name = "openai"
            dialect = "openai-chat"
            api_key = "sk-test"

            [[models]]
            id = 1
            name = "gpt-4o"

            [[bindings]]
            id = 1
            model_id = 1
            provider_id = 1
            provider_model = "gpt-4o"

            [[bindings]]
            id = 2
            model_id = 1
            provider_id = 1
            provider_model = "gpt-4o"
        "#})
        .expect_err("duplicate triple");

        assert!(error.to_string().contains("duplicate binding"));
    }

    #[test]
    fn rejects_unknown_dialect() {
        let error = parse(indoc! {r#"
            [[providers]]
            id = 1
            name = "mystery"
            dialect = "grpc"
            api_key = "sk-test"
        "#})
        .expect_err("unknown dialect");

        assert!(error.to_string().contains("unknown provider dialect"));
    }
}
