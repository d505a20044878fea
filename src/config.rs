use serde::{Deserialize, Serialize};

use crate::activation::ActivationKind;
use crate::error::{Error, Result};

/// Shape of a recurrent layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// External inputs, bias excluded.
    pub num_inputs: usize,
    pub num_nodes: usize,
    #[serde(default = "default_activation")]
    pub activation: ActivationKind,
}

impl LayerConfig {
    pub fn new(num_inputs: usize, num_nodes: usize, activation: ActivationKind) -> Self {
        Self {
            num_inputs,
            num_nodes,
            activation,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_nodes == 0 {
            return Err(Error::InvalidConfig(
                "a layer needs at least one node".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_activation() -> ActivationKind {
    ActivationKind::Tanh
}

/// How weight changes are applied while replaying a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearningMode {
    /// Step the weights after every time step.
    Online,
    /// Accumulate over the sequence, then step once along the average.
    Batch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Factor applied to the non-bias weights before each update. `1.0` disables decay.
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
    #[serde(default = "default_mode")]
    pub mode: LearningMode,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            weight_decay: default_weight_decay(),
            mode: default_mode(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.weight_decay > 0.0 && self.weight_decay <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "weight decay must be in (0, 1], got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}

fn default_learning_rate() -> f64 {
    0.1
}
fn default_weight_decay() -> f64 {
    1.0
}
fn default_mode() -> LearningMode {
    LearningMode::Online
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TrainingConfig::default();
        assert_eq!(config.mode, LearningMode::Online);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let config = TrainingConfig {
            learning_rate: 0.0,
            ..TrainingConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TrainingConfig {
            weight_decay: 1.5,
            ..TrainingConfig::default()
        };
        assert!(config.validate().is_err());

        let layer = LayerConfig::new(3, 0, ActivationKind::Sigmoid);
        assert!(matches!(layer.validate(), Err(Error::InvalidConfig(_))));
    }
}
