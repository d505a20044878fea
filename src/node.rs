use std::fmt;

use log::debug;
use ndarray::{s, Array1, ArrayView1};
use ndarray_rand::rand::{thread_rng, Rng};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;

use crate::activation::{Activation, ActivationKind};
use crate::error::{check_len, Error, Result};

/// Scratch values of a node, valid for the time step currently being processed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeStep {
    /// Weighted sum of inputs and feedback before the non-linearity.
    pub weighted_sum: f64,
    pub output: f64,
    /// Derivative of the loss with respect to `weighted_sum`.
    pub delta: f64,
    /// `delta` of the time step one later in the sequence.
    pub forward_delta: f64,
}

/// A pair of vectors shaped like a node's weights.
/// Used both for the weights themselves and for accumulated batch changes.
#[derive(Debug, Clone, PartialEq)]
struct WeightVectors {
    input: Array1<f64>,
    feedback: Array1<f64>,
}

impl WeightVectors {
    fn zeros(num_inputs: usize, num_feedback: usize) -> Self {
        Self {
            input: Array1::zeros(num_inputs),
            feedback: Array1::zeros(num_feedback),
        }
    }

    // `seed[0]` goes to the bias, the rest cycles over every other weight.
    fn from_seed(seed: &[f64], num_inputs: usize, num_feedback: usize) -> Self {
        if seed.len() == 1 {
            return Self {
                input: Array1::from_elem(num_inputs, seed[0]),
                feedback: Array1::from_elem(num_feedback, seed[0]),
            };
        }

        let mut cycle = seed[1..].iter().copied().cycle();
        let mut input = cycle.by_ref().take(num_inputs - 1).collect::<Vec<_>>();
        input.push(seed[0]);
        let feedback = cycle.take(num_feedback).collect::<Vec<_>>();
        Self {
            input: Array1::from_vec(input),
            feedback: Array1::from_vec(feedback),
        }
    }

    fn random<R: Rng>(num_inputs: usize, num_feedback: usize, rng: &mut R) -> Result<Self> {
        let num_weights = num_inputs + num_feedback;
        let std_dev = 1.0 / num_weights as f64;
        let scaled = Normal::new(0.0, std_dev)
            .map_err(|e| Error::InvalidConfig(format!("weight distribution: {}", e)))?;
        let unit = Normal::new(0.0, 1.0)
            .map_err(|e| Error::InvalidConfig(format!("bias distribution: {}", e)))?;

        let mut input = Array1::random_using(num_inputs, scaled, rng);
        input[num_inputs - 1] = rng.sample(unit);
        let feedback = Array1::random_using(num_feedback, scaled, rng);
        Ok(Self { input, feedback })
    }
}

/// A single recurrent unit.
///
/// Besides its external inputs (the last of which is the constant bias input), a node
/// receives the previous outputs of every node of its layer, itself included, as
/// feedback.
#[derive(Clone)]
pub struct Node {
    kind: ActivationKind,
    activation: &'static dyn Activation,
    num_inputs: usize,
    num_feedback: usize,
    weights: Option<WeightVectors>,
    step: TimeStep,
    output_history: Vec<f64>,
    accumulations: Option<WeightVectors>,
}

impl Node {
    /// Create a node taking `num_inputs` external inputs (a bias input is added on top)
    /// and `num_feedback` feedback values.
    /// Weights stay unallocated until `init_weights` is called.
    pub fn new(num_inputs: usize, num_feedback: usize, kind: ActivationKind) -> Self {
        Self {
            kind,
            activation: kind.strategy(),
            num_inputs: num_inputs + 1,
            num_feedback,
            weights: None,
            step: TimeStep::default(),
            output_history: vec![0.0],
            accumulations: None,
        }
    }

    /// Create an initialized node from explicit weights.
    /// The last entry of `input_weights` is the bias weight.
    pub fn with_weights(
        kind: ActivationKind,
        input_weights: Array1<f64>,
        feedback_weights: Array1<f64>,
    ) -> Result<Self> {
        if input_weights.is_empty() {
            return Err(Error::InvalidConfig(
                "input weights must contain at least the bias weight".to_string(),
            ));
        }
        let mut node = Node::new(input_weights.len() - 1, feedback_weights.len(), kind);
        node.weights = Some(WeightVectors {
            input: input_weights,
            feedback: feedback_weights,
        });
        Ok(node)
    }

    pub fn activation(&self) -> ActivationKind {
        self.kind
    }

    /// Number of input weights, bias included.
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_feedback(&self) -> usize {
        self.num_feedback
    }

    pub fn num_weights(&self) -> usize {
        self.num_inputs + self.num_feedback
    }

    pub fn input_weights(&self) -> Option<ArrayView1<f64>> {
        self.weights.as_ref().map(|w| w.input.view())
    }

    pub fn feedback_weights(&self) -> Option<ArrayView1<f64>> {
        self.weights.as_ref().map(|w| w.feedback.view())
    }

    pub fn time_step(&self) -> TimeStep {
        self.step
    }

    pub fn last_output(&self) -> f64 {
        self.step.output
    }

    pub fn delta(&self) -> f64 {
        self.step.delta
    }

    /// Initialize weights from the thread-local random generator or from `seed`.
    /// See `init_weights_using`.
    pub fn init_weights(&mut self, seed: Option<&[f64]>) -> Result<()> {
        self.init_weights_using(seed, &mut thread_rng())
    }

    /// Initialize weights.
    ///
    /// * `None` (or an empty seed) draws every weight from a zero-mean Gaussian, with a
    ///   standard deviation of `1 / num_weights` except for the bias, which uses `1.0`.
    /// * A single value is copied into every weight.
    /// * Several values: the first is the bias, the others are repeated cyclically over
    ///   the input weights and then the feedback weights.
    pub fn init_weights_using<R: Rng>(&mut self, seed: Option<&[f64]>, rng: &mut R) -> Result<()> {
        let weights = match seed {
            Some(seed) if !seed.is_empty() => {
                debug!(
                    "seeding {} weights from {} values",
                    self.num_weights(),
                    seed.len()
                );
                WeightVectors::from_seed(seed, self.num_inputs, self.num_feedback)
            }
            _ => {
                debug!("drawing {} random weights", self.num_weights());
                WeightVectors::random(self.num_inputs, self.num_feedback, rng)?
            }
        };
        self.weights = Some(weights);
        Ok(())
    }

    fn weights(&self) -> Result<&WeightVectors> {
        self.weights.as_ref().ok_or(Error::UninitializedWeights)
    }

    fn check_shapes(&self, inputs: &ArrayView1<f64>, feedback: &ArrayView1<f64>) -> Result<()> {
        check_len("input", self.num_inputs, inputs.len())?;
        check_len("feedback", self.num_feedback, feedback.len())
    }

    /// Run the node for one time step.
    /// `inputs` must end with the constant bias input `1.0`.
    /// SoftMax nodes return `exp(sum)`; the owning layer replaces it with the
    /// normalized value.
    pub fn node_output(
        &mut self,
        inputs: ArrayView1<f64>,
        feedback: ArrayView1<f64>,
    ) -> Result<f64> {
        self.check_shapes(&inputs, &feedback)?;
        let weights = self.weights()?;
        let sum = weights.input.dot(&inputs) + weights.feedback.dot(&feedback);

        self.step.weighted_sum = sum;
        self.step.output = self.activation.activate(sum);
        Ok(self.step.output)
    }

    pub(crate) fn set_output(&mut self, output: f64) {
        self.step.output = output;
    }

    /// Set the delta of an output node from the value it should have produced.
    pub fn final_node_delta(&mut self, expected: f64) -> f64 {
        self.step.delta = self.activation.loss_derivative(self.step.output, expected);
        self.step.delta
    }

    /// Roll the current delta into `forward_delta` and start a fresh accumulation.
    pub fn reset_delta(&mut self) {
        self.step.forward_delta = self.step.delta;
        self.step.delta = 0.0;
    }

    pub fn add_to_delta(&mut self, x: f64) {
        self.step.delta += x;
    }

    /// Contribution of this node's delta to input `index` of this layer.
    pub fn weight_times_delta(&self, index: usize) -> Result<f64> {
        let weights = self.weights()?;
        let weight = weights.input.get(index).ok_or(Error::ShapeMismatch {
            what: "input weight index",
            expected: self.num_inputs,
            actual: index,
        })?;
        Ok(weight * self.step.delta)
    }

    /// Contribution of this node's forward delta to sibling `index`, through time.
    pub fn recurrent_weight_times_forward_delta(&self, index: usize) -> Result<f64> {
        let weights = self.weights()?;
        let weight = weights.feedback.get(index).ok_or(Error::ShapeMismatch {
            what: "feedback weight index",
            expected: self.num_feedback,
            actual: index,
        })?;
        Ok(weight * self.step.forward_delta)
    }

    /// Apply the activation derivative to a delta accumulated from later layers and time
    /// steps. Must be called exactly once per step, after every contribution is added.
    pub fn multiply_delta_by_non_linearity_derivative(&mut self) -> Result<()> {
        let derivative = self
            .activation
            .local_derivative(self.step.output)
            .ok_or(Error::InvalidActivationForRole(self.kind))?;
        self.step.delta *= derivative;
        Ok(())
    }

    /// Take one gradient descent step right away. Returns the last output.
    pub fn update_weights(
        &mut self,
        inputs: ArrayView1<f64>,
        feedback: ArrayView1<f64>,
        learning_rate: f64,
    ) -> Result<f64> {
        self.check_shapes(&inputs, &feedback)?;
        let scale = -learning_rate * self.step.delta;
        let weights = self.weights.as_mut().ok_or(Error::UninitializedWeights)?;
        weights.input.scaled_add(scale, &inputs);
        weights.feedback.scaled_add(scale, &feedback);
        Ok(self.step.output)
    }

    /// Start a new batch with zeroed accumulations.
    pub fn clear_weight_changes(&mut self) {
        match self.accumulations.as_mut() {
            Some(acc) => {
                acc.input.fill(0.0);
                acc.feedback.fill(0.0);
            }
            None => {
                self.accumulations = Some(WeightVectors::zeros(self.num_inputs, self.num_feedback))
            }
        }
    }

    /// Add this step's gradient to the batch accumulations. Returns the last output.
    pub fn append_weight_changes(
        &mut self,
        inputs: ArrayView1<f64>,
        feedback: ArrayView1<f64>,
    ) -> Result<f64> {
        self.check_shapes(&inputs, &feedback)?;
        self.weights()?;
        let delta = self.step.delta;
        let (num_inputs, num_feedback) = (self.num_inputs, self.num_feedback);
        let acc = self
            .accumulations
            .get_or_insert_with(|| WeightVectors::zeros(num_inputs, num_feedback));
        acc.input.scaled_add(delta, &inputs);
        acc.feedback.scaled_add(delta, &feedback);
        Ok(self.step.output)
    }

    /// Apply the accumulated changes. `learning_rate` should already be divided by the
    /// number of accumulated steps to descend along the batch average.
    pub fn update_weights_from_accumulations(&mut self, learning_rate: f64) -> Result<()> {
        let weights = self.weights.as_mut().ok_or(Error::UninitializedWeights)?;
        if let Some(acc) = self.accumulations.as_ref() {
            weights.input.scaled_add(-learning_rate, &acc.input);
            weights.feedback.scaled_add(-learning_rate, &acc.feedback);
        }
        Ok(())
    }

    /// Multiply every weight except the bias by `factor`. Factors of 1 or more leave
    /// the weights untouched.
    pub fn decay_weights(&mut self, factor: f64) -> Result<()> {
        let weights = self.weights.as_mut().ok_or(Error::UninitializedWeights)?;
        if factor >= 1.0 {
            return Ok(());
        }
        let bias = weights.input.len() - 1;
        weights
            .input
            .slice_mut(s![..bias])
            .mapv_inplace(|w| w * factor);
        weights.feedback.mapv_inplace(|w| w * factor);
        Ok(())
    }

    pub fn reset_sequence(&mut self) {
        self.step.output = 0.0;
        self.step.delta = 0.0;
        self.output_history.clear();
        self.output_history.push(0.0);
    }

    pub fn store_recurrent_values(&mut self) {
        self.output_history.push(self.step.output);
    }

    /// Number of outputs stored since the last `reset_sequence`.
    pub fn stored_steps(&self) -> usize {
        self.output_history.len() - 1
    }

    /// Pop the most recent stored output back into the current output.
    /// The time-zero entry left by `reset_sequence` cannot be popped.
    pub fn last_recurrent_value(&mut self) -> Result<f64> {
        if self.stored_steps() == 0 {
            return Err(Error::HistoryUnderflow);
        }
        self.step.output = self.output_history.pop().unwrap_or_default();
        Ok(self.step.output)
    }

    /// Output of the previous time step, without touching the history.
    pub fn previous_output_value(&self) -> f64 {
        self.output_history.last().copied().unwrap_or(0.0)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("activation", &self.kind)
            .field("num_inputs", &self.num_inputs)
            .field("num_feedback", &self.num_feedback)
            .field("weights", &self.weights)
            .field("step", &self.step)
            .field("output_history", &self.output_history)
            .finish()
    }
}
