//! Backpropagation through time for a single output layer.

use log::{debug, trace};
use ndarray::Array1;

use crate::config::{LearningMode, TrainingConfig};
use crate::error::{check_len, Result};
use crate::layer::NetworkLayer;

/// Run `inputs` through `layer` from a fresh sequence state and return every step's
/// outputs.
pub fn predict_sequence<L>(layer: &mut L, inputs: &[Array1<f64>]) -> Result<Vec<Array1<f64>>>
where
    L: NetworkLayer + ?Sized,
{
    layer.reset_sequence();
    inputs
        .iter()
        .map(|input| -> Result<Array1<f64>> {
            let outputs = layer.layer_outputs(input.view())?;
            layer.store_recurrent_values();
            Ok(outputs)
        })
        .collect()
}

/// Train `layer` as an output layer on one sequence.
///
/// The sequence is run forward while storing outputs, then replayed backward, with
/// weights updated per step or once from the batch average depending on
/// `config.mode`. Returns the mean squared error of the forward pass.
pub fn train_sequence<L>(
    layer: &mut L,
    inputs: &[Array1<f64>],
    targets: &[Array1<f64>],
    config: &TrainingConfig,
) -> Result<f64>
where
    L: NetworkLayer + ?Sized,
{
    config.validate()?;
    check_len("target sequence", inputs.len(), targets.len())?;
    if inputs.is_empty() {
        return Ok(0.0);
    }

    layer.reset_sequence();
    let mut squared_error = 0.0;
    for (input, target) in inputs.iter().zip(targets) {
        check_len("target", layer.output_len(), target.len())?;
        let outputs = layer.layer_outputs(input.view())?;
        squared_error += (&outputs - target).mapv(|e| e * e).sum();
        layer.store_recurrent_values();
    }

    if config.mode == LearningMode::Batch {
        layer.clear_weight_changes();
    }
    for (input, target) in inputs.iter().zip(targets).rev() {
        layer.retrieve_recurrent_values()?;
        layer.final_layer_delta(target.view())?;
        let outputs = match config.mode {
            LearningMode::Online => {
                layer.update_weights(input.view(), config.learning_rate, config.weight_decay)?
            }
            LearningMode::Batch => layer.append_weight_changes(input.view())?,
        };
        trace!("replayed step with outputs {}", outputs);
    }
    if config.mode == LearningMode::Batch {
        let average_rate = config.learning_rate / inputs.len() as f64;
        layer.update_weights_from_accumulations(average_rate, config.weight_decay)?;
    }

    let error = squared_error / (inputs.len() * layer.output_len()) as f64;
    debug!(
        "{:?} pass over {} steps, mean squared error {}",
        config.mode,
        inputs.len(),
        error
    );
    Ok(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::arr1;

    use crate::activation::ActivationKind;
    use crate::error::Error;
    use crate::layer::RecurrentLayer;

    fn doubling_task() -> (Vec<Array1<f64>>, Vec<Array1<f64>>) {
        let xs = [0.5, -0.3, 0.8, 0.1];
        let inputs = xs.iter().map(|&x| arr1(&[x])).collect();
        let targets = xs.iter().map(|&x| arr1(&[2.0 * x])).collect();
        (inputs, targets)
    }

    fn train(config: &TrainingConfig, epochs: usize) -> (f64, f64) {
        let (inputs, targets) = doubling_task();
        let mut layer = RecurrentLayer::new(1, 1, ActivationKind::Identity);
        layer.init_weights(Some(&[0.0])).unwrap();

        let first = train_sequence(&mut layer, &inputs, &targets, config).unwrap();
        let mut last = first;
        for _ in 0..epochs {
            last = train_sequence(&mut layer, &inputs, &targets, config).unwrap();
        }
        (first, last)
    }

    #[test]
    fn online_training_reduces_error() {
        let config = TrainingConfig {
            learning_rate: 0.05,
            ..TrainingConfig::default()
        };
        let (first, last) = train(&config, 500);
        assert!(last < first * 0.1, "{} -> {}", first, last);
        assert!(last < 0.05);
    }

    #[test]
    fn batch_training_reduces_error() {
        let config = TrainingConfig {
            learning_rate: 0.2,
            mode: LearningMode::Batch,
            ..TrainingConfig::default()
        };
        let (first, last) = train(&config, 1000);
        assert!(last < first * 0.1, "{} -> {}", first, last);
    }

    #[test]
    fn first_pass_error_with_zero_weights() {
        let (inputs, targets) = doubling_task();
        let mut layer = RecurrentLayer::new(1, 1, ActivationKind::Identity);
        layer.init_weights(Some(&[0.0])).unwrap();
        let error = train_sequence(&mut layer, &inputs, &targets, &TrainingConfig::default())
            .unwrap();
        // Mean of (2x)^2 over the sequence.
        assert_relative_eq!(error, (1.0 + 0.36 + 2.56 + 0.04) / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn predict_uses_recurrence() {
        let mut layer = RecurrentLayer::new(1, 1, ActivationKind::Identity);
        // Bias 0, input weight 1, feedback weight 1: a running sum.
        layer.init_weights(Some(&[0.0, 1.0])).unwrap();
        let inputs = vec![arr1(&[1.0]), arr1(&[2.0]), arr1(&[3.0])];
        let outputs = predict_sequence(&mut layer, &inputs).unwrap();
        let sums = outputs.iter().map(|o| o[0]).collect::<Vec<_>>();
        assert_eq!(sums, vec![1.0, 3.0, 6.0]);
    }

    #[test]
    fn mismatched_sequences_are_rejected() {
        let (inputs, targets) = doubling_task();
        let mut layer = RecurrentLayer::new(1, 1, ActivationKind::Identity);
        layer.init_weights(Some(&[0.0])).unwrap();
        let result = train_sequence(
            &mut layer,
            &inputs,
            &targets[..2],
            &TrainingConfig::default(),
        );
        assert_eq!(
            result,
            Err(Error::ShapeMismatch {
                what: "target sequence",
                expected: 4,
                actual: 2
            })
        );
    }
}
