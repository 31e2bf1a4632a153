use serde::{Deserialize, Serialize};

/// Registry tunables. Every field has a default so a partial JSON document
/// (or `{}`) is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Longest identity list `find_richest` accepts. Cost grows linearly:
    /// k - 1 comparisons and 2(k - 1) blinded multiplies.
    pub max_candidates: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_candidates: 64 }
    }
}

impl RegistryConfig {
    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_candidates == 0 {
            anyhow::bail!("max_candidates must be at least 1");
        }
        Ok(())
    }
}
