//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.into()))
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.online.time_budget_mins == 0 {
            return invalid("online.time_budget_mins must be > 0");
        }
        if self.online.bulk_size == 0 {
            return invalid("online.bulk_size must be > 0");
        }
        if self.online.round_size == 0 {
            return invalid("online.round_size must be > 0");
        }
        if self.online.seed_multiplier == 0 {
            return invalid("online.seed_multiplier must be > 0");
        }
        if self.offline.num_tests == 0 {
            return invalid("offline.num_tests must be > 0");
        }
        if self.offline.num_unsafe == 0 {
            return invalid("offline.num_unsafe must be > 0");
        }
        if self.offline.rounds == 0 {
            return invalid("offline.rounds must be >= 1");
        }
        if !(self.offline.ratio > 0.0 && self.offline.ratio < 1.0) {
            return invalid("offline.ratio must be strictly between 0.0 and 1.0");
        }
        if !(self.offline.train_ratio > 0.0 && self.offline.train_ratio < 1.0) {
            return invalid("offline.train_ratio must be strictly between 0.0 and 1.0");
        }
        if self.classifier.models.is_empty() {
            return invalid("classifier.models must name at least one model");
        }
        if self.classifier.evaluation_ratios.is_empty() {
            return invalid("classifier.evaluation_ratios must not be empty");
        }
        if self
            .classifier
            .evaluation_ratios
            .iter()
            .any(|r| !(*r > 0.0 && *r < 1.0))
        {
            return invalid("classifier.evaluation_ratios must be strictly between 0.0 and 1.0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_bulk_size() {
        let mut config = Config::default();
        config.online.bulk_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bulk_size"));
    }

    #[test]
    fn test_validate_rejects_zero_rounds() {
        let mut config = Config::default();
        config.offline.rounds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("offline.rounds"));
    }

    #[test]
    fn test_validate_rejects_ratio_bounds() {
        let mut config = Config::default();
        for bad in [0.0, 1.0, -0.2, 1.5] {
            config.offline.ratio = bad;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("offline.ratio"));
        }
    }

    #[test]
    fn test_validate_rejects_empty_model_list() {
        let mut config = Config::default();
        config.classifier.models.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("classifier.models"));
    }

    #[test]
    fn test_validate_rejects_evaluation_ratio_bounds() {
        let mut config = Config::default();
        config.classifier.evaluation_ratios = vec![0.5, 1.0];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("classifier.evaluation_ratios"));

        config.classifier.evaluation_ratios.clear();
        assert!(config.validate().is_err());
    }
}
