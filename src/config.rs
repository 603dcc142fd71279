//! Training configuration with YAML files and sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub backprop: BackpropConfig,
    /// Worker-pool size hint; `None` uses the default global pool
    #[serde(default)]
    pub threads: Option<usize>,
}

/// Genetic trainer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of individuals, fixed for the population's lifetime
    pub capacity: usize,
    /// Fraction retained after each selection (0, 1]
    pub survival_rate: f64,
    /// Mutation rate applied to every child
    pub mutation_rate: f64,
}

/// Back-propagation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackpropConfig {
    pub learning_rate: f64,
    /// Fraction of the previous delta carried into each weight step
    pub momentum: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            population: PopulationConfig::default(),
            backprop: BackpropConfig::default(),
            threads: None,
        }
    }
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            survival_rate: 0.01,
            mutation_rate: 0.25,
        }
    }
}

impl Default for BackpropConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            momentum: 0.3,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.population.capacity < 2 {
            return Err("population capacity must be at least 2".to_string());
        }
        if !(self.population.survival_rate > 0.0 && self.population.survival_rate <= 1.0) {
            return Err("survival_rate must be in (0, 1]".to_string());
        }
        if self.population.mutation_rate < 0.0 {
            return Err("mutation_rate must be non-negative".to_string());
        }
        if self.backprop.learning_rate <= 0.0 {
            return Err("learning_rate must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.backprop.momentum) {
            return Err("momentum must be in [0, 1)".to_string());
        }
        if self.threads == Some(0) {
            return Err("threads hint must be positive when set".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = Config::default();
        config.population.capacity = 500;
        config.threads = Some(4);

        let yaml = serde_yaml::to_string(&config).unwrap();
        let loaded: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(loaded.population.capacity, 500);
        assert_eq!(loaded.threads, Some(4));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let loaded: Config = serde_yaml::from_str("threads: 2\n").unwrap();
        assert_eq!(loaded.threads, Some(2));
        assert_eq!(loaded.population.capacity, 10_000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.population.survival_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.backprop.momentum = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.threads = Some(0);
        assert!(config.validate().is_err());
    }
}
