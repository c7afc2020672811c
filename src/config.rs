use crate::error::ScribeError;

/// Hyperparameters for one training run.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Hidden units in the first recurrent layer.
    pub l1_units: usize,
    /// Hidden units in the second recurrent layer.
    pub l2_units: usize,
    /// Standard deviation of the Gaussian noise injected during training.
    pub noise_sigma: f64,
    /// Fraction of batches used for weight updates; the rest are held out.
    pub split_ratio: f64,
    pub seed: u64,
    /// Slabs wider than this are truncated, narrower ones zero-padded.
    pub max_time: usize,
}

impl TrainConfig {
    pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;
    pub const DEFAULT_BATCH_SIZE: usize = 5;
    pub const DEFAULT_NOISE_SIGMA: f64 = 0.6;
    pub const DEFAULT_SPLIT_RATIO: f64 = 0.7;
    pub const DEFAULT_MAX_TIME: usize = 20;

    pub fn validate(&self) -> Result<(), ScribeError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ScribeError::invalid_config(
                "learning_rate",
                format!("must be positive and finite, got {}", self.learning_rate),
            ));
        }
        if self.batch_size == 0 {
            return Err(ScribeError::invalid_config("batch_size", "must be at least 1"));
        }
        if self.l1_units == 0 {
            return Err(ScribeError::invalid_config("l1_units", "needs at least one unit"));
        }
        if self.l2_units == 0 {
            return Err(ScribeError::invalid_config("l2_units", "needs at least one unit"));
        }
        if !(self.noise_sigma.is_finite() && self.noise_sigma >= 0.0) {
            return Err(ScribeError::invalid_config(
                "noise_sigma",
                format!("must be non-negative and finite, got {}", self.noise_sigma),
            ));
        }
        if !(0.0..=1.0).contains(&self.split_ratio) {
            return Err(ScribeError::invalid_config(
                "split_ratio",
                format!("must lie in [0, 1], got {}", self.split_ratio),
            ));
        }
        if self.max_time == 0 {
            return Err(ScribeError::invalid_config("max_time", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: Self::DEFAULT_LEARNING_RATE,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            epochs: 1,
            l1_units: 64,
            l2_units: 64,
            noise_sigma: Self::DEFAULT_NOISE_SIGMA,
            split_ratio: Self::DEFAULT_SPLIT_RATIO,
            seed: 42,
            max_time: Self::DEFAULT_MAX_TIME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_config_default() {
        let config = TrainConfig::default();
        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.epochs, 1);
        assert_eq!(config.l1_units, 64);
        assert_eq!(config.l2_units, 64);
        assert_eq!(config.noise_sigma, 0.6);
        assert_eq!(config.split_ratio, 0.7);
        assert_eq!(config.max_time, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_batch() {
        let config = TrainConfig {
            batch_size: 0,
            ..TrainConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ScribeError::InvalidConfig {
                field: "batch_size",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_split() {
        let config = TrainConfig {
            split_ratio: 1.5,
            ..TrainConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ScribeError::InvalidConfig {
                field: "split_ratio",
                ..
            })
        ));

        let config = TrainConfig {
            split_ratio: -0.1,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_noise() {
        let config = TrainConfig {
            noise_sigma: -0.5,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_zero_noise() {
        let config = TrainConfig {
            noise_sigma: 0.0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_learning_rate() {
        for lr in [0.0, -1e-3, f64::NAN, f64::INFINITY] {
            let config = TrainConfig {
                learning_rate: lr,
                ..TrainConfig::default()
            };
            assert!(config.validate().is_err(), "lr {lr} should be rejected");
        }
    }
}
