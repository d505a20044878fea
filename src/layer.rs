use log::{debug, trace};
use ndarray::{Array1, ArrayView1};
use ndarray_rand::rand::{thread_rng, Rng};

use crate::activation::ActivationKind;
use crate::config::LayerConfig;
use crate::error::{check_len, Error, Result};
use crate::node::Node;

/// Interface a multi-layer network drives its layers through.
///
/// Inputs passed to a layer are the external inputs only; the layer appends the bias
/// input itself.
pub trait NetworkLayer {
    /// Number of external inputs, bias excluded.
    fn input_len(&self) -> usize;

    fn output_len(&self) -> usize;

    fn init_weights(&mut self, seed: Option<&[f64]>) -> Result<()>;

    /// Run one time step forward.
    fn layer_outputs(&mut self, inputs: ArrayView1<f64>) -> Result<Array1<f64>>;

    /// Current output of every node.
    fn last_outputs(&self) -> Array1<f64>;

    /// Set deltas of an output layer from the expected outputs.
    fn final_layer_delta(&mut self, expected: ArrayView1<f64>) -> Result<()>;

    /// Set deltas of a hidden layer from the layer it feeds and from its own deltas of
    /// the later time step.
    fn layer_delta(&mut self, next_layer: &dyn NetworkLayer) -> Result<()>;

    /// Sum over nodes of `input_weight[weight_index] * delta`: the error flowing back
    /// into input `weight_index` of this layer.
    fn sum_of_weights_times_delta(&self, weight_index: usize) -> Result<f64>;

    fn update_weights(
        &mut self,
        inputs: ArrayView1<f64>,
        learning_rate: f64,
        weight_decay: f64,
    ) -> Result<Array1<f64>>;

    fn clear_weight_changes(&mut self);

    fn append_weight_changes(&mut self, inputs: ArrayView1<f64>) -> Result<Array1<f64>>;

    fn update_weights_from_accumulations(
        &mut self,
        average_rate: f64,
        weight_decay: f64,
    ) -> Result<()>;

    /// Multiply every non-bias weight by `factor`; a no-op for factors of 1 or more.
    fn decay_weights(&mut self, factor: f64) -> Result<()>;

    fn reset_sequence(&mut self);

    fn store_recurrent_values(&mut self);

    fn retrieve_recurrent_values(&mut self) -> Result<()>;
}

/// Fully recurrent layer: every node sees the external inputs and the previous outputs
/// of all nodes of the layer.
#[derive(Debug, Clone)]
pub struct RecurrentLayer {
    num_inputs: usize,
    activation: ActivationKind,
    nodes: Vec<Node>,
}

impl RecurrentLayer {
    pub fn new(num_inputs: usize, num_nodes: usize, activation: ActivationKind) -> Self {
        let nodes = (0..num_nodes)
            .map(|_| Node::new(num_inputs, num_nodes, activation))
            .collect();
        Self {
            num_inputs,
            activation,
            nodes,
        }
    }

    pub fn from_config(config: &LayerConfig) -> Result<Self> {
        config.validate()?;
        Ok(RecurrentLayer::new(
            config.num_inputs,
            config.num_nodes,
            config.activation,
        ))
    }

    /// Build a layer out of already constructed nodes.
    /// All nodes must share shapes and activation, with one feedback weight per node.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self> {
        let first = nodes
            .first()
            .ok_or_else(|| Error::InvalidConfig("a layer needs at least one node".to_string()))?;
        let (num_inputs, activation) = (first.num_inputs(), first.activation());
        for node in &nodes {
            check_len("input weight", num_inputs, node.num_inputs())?;
            check_len("feedback weight", nodes.len(), node.num_feedback())?;
            if node.activation() != activation {
                return Err(Error::InvalidConfig(format!(
                    "mixed activations {:?} and {:?} in one layer",
                    activation,
                    node.activation()
                )));
            }
        }
        Ok(Self {
            num_inputs: num_inputs - 1,
            activation,
            nodes,
        })
    }

    pub fn activation(&self) -> ActivationKind {
        self.activation
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Initialize every node with the same `seed`, drawing random weights from `rng`
    /// when there is none.
    pub fn init_weights_using<R: Rng>(&mut self, seed: Option<&[f64]>, rng: &mut R) -> Result<()> {
        debug!(
            "initializing {} {:?} nodes with {} inputs",
            self.nodes.len(),
            self.activation,
            self.num_inputs
        );
        for node in &mut self.nodes {
            node.init_weights_using(seed, rng)?;
        }
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.nodes.iter().all(|node| node.input_weights().is_some()) {
            Ok(())
        } else {
            Err(Error::UninitializedWeights)
        }
    }

    fn with_bias(&self, inputs: ArrayView1<f64>) -> Result<Array1<f64>> {
        check_len("input", self.num_inputs, inputs.len())?;
        Ok(inputs.iter().copied().chain(std::iter::once(1.0)).collect())
    }

    // Softmax of the stored weighted sums, shifted by their maximum so `exp` stays finite.
    fn normalized_exponentials(&self) -> Array1<f64> {
        let sums = self
            .nodes
            .iter()
            .map(|node| node.time_step().weighted_sum)
            .collect::<Array1<f64>>();
        let max_element = sums.iter().fold(f64::NAN, |v, &w| v.max(w));
        let exp_each = sums.map(|v| (v - max_element).exp());
        let total = exp_each.sum();
        exp_each / total
    }

    // Feedback that was active when the outputs being trained on were computed.
    fn previous_outputs(&self) -> Array1<f64> {
        self.nodes
            .iter()
            .map(|node| node.previous_output_value())
            .collect()
    }
}

impl NetworkLayer for RecurrentLayer {
    fn input_len(&self) -> usize {
        self.num_inputs
    }

    fn output_len(&self) -> usize {
        self.nodes.len()
    }

    fn init_weights(&mut self, seed: Option<&[f64]>) -> Result<()> {
        self.init_weights_using(seed, &mut thread_rng())
    }

    fn layer_outputs(&mut self, inputs: ArrayView1<f64>) -> Result<Array1<f64>> {
        let inputs = self.with_bias(inputs)?;
        self.ensure_initialized()?;

        let feedback = self.last_outputs();
        let mut outputs = self
            .nodes
            .iter_mut()
            .map(|node| node.node_output(inputs.view(), feedback.view()))
            .collect::<Result<Array1<f64>>>()?;

        if self.activation == ActivationKind::SoftMax {
            outputs = self.normalized_exponentials();
            for (node, &output) in self.nodes.iter_mut().zip(outputs.iter()) {
                node.set_output(output);
            }
        }
        trace!("layer outputs {}", outputs);
        Ok(outputs)
    }

    fn last_outputs(&self) -> Array1<f64> {
        self.nodes.iter().map(|node| node.last_output()).collect()
    }

    fn final_layer_delta(&mut self, expected: ArrayView1<f64>) -> Result<()> {
        check_len("expected output", self.nodes.len(), expected.len())?;
        for (node, &expected) in self.nodes.iter_mut().zip(expected.iter()) {
            node.final_node_delta(expected);
        }
        Ok(())
    }

    fn layer_delta(&mut self, next_layer: &dyn NetworkLayer) -> Result<()> {
        check_len("next layer input", self.nodes.len(), next_layer.input_len())?;
        if self.activation == ActivationKind::SoftMax {
            return Err(Error::InvalidActivationForRole(self.activation));
        }
        self.ensure_initialized()?;

        for node in &mut self.nodes {
            node.reset_delta();
        }

        // Every forward delta is rolled before any sibling reads it.
        let mut contributions = Vec::with_capacity(self.nodes.len());
        for index in 0..self.nodes.len() {
            let through_layers = next_layer.sum_of_weights_times_delta(index)?;
            let through_time = self
                .nodes
                .iter()
                .map(|sibling| sibling.recurrent_weight_times_forward_delta(index))
                .sum::<Result<f64>>()?;
            contributions.push((through_layers, through_time));
        }

        for (node, (through_layers, through_time)) in self.nodes.iter_mut().zip(contributions) {
            node.add_to_delta(through_layers);
            node.add_to_delta(through_time);
            node.multiply_delta_by_non_linearity_derivative()?;
        }
        trace!(
            "hidden deltas {:?}",
            self.nodes.iter().map(|node| node.delta()).collect::<Vec<_>>()
        );
        Ok(())
    }

    fn sum_of_weights_times_delta(&self, weight_index: usize) -> Result<f64> {
        self.nodes
            .iter()
            .map(|node| node.weight_times_delta(weight_index))
            .sum()
    }

    fn update_weights(
        &mut self,
        inputs: ArrayView1<f64>,
        learning_rate: f64,
        weight_decay: f64,
    ) -> Result<Array1<f64>> {
        let inputs = self.with_bias(inputs)?;
        self.ensure_initialized()?;
        self.decay_weights(weight_decay)?;

        let feedback = self.previous_outputs();
        self.nodes
            .iter_mut()
            .map(|node| node.update_weights(inputs.view(), feedback.view(), learning_rate))
            .collect()
    }

    fn clear_weight_changes(&mut self) {
        for node in &mut self.nodes {
            node.clear_weight_changes();
        }
    }

    fn append_weight_changes(&mut self, inputs: ArrayView1<f64>) -> Result<Array1<f64>> {
        let inputs = self.with_bias(inputs)?;
        self.ensure_initialized()?;

        let feedback = self.previous_outputs();
        self.nodes
            .iter_mut()
            .map(|node| node.append_weight_changes(inputs.view(), feedback.view()))
            .collect()
    }

    fn update_weights_from_accumulations(
        &mut self,
        average_rate: f64,
        weight_decay: f64,
    ) -> Result<()> {
        self.ensure_initialized()?;
        self.decay_weights(weight_decay)?;
        for node in &mut self.nodes {
            node.update_weights_from_accumulations(average_rate)?;
        }
        Ok(())
    }

    fn decay_weights(&mut self, factor: f64) -> Result<()> {
        for node in &mut self.nodes {
            node.decay_weights(factor)?;
        }
        Ok(())
    }

    fn reset_sequence(&mut self) {
        for node in &mut self.nodes {
            node.reset_sequence();
        }
    }

    fn store_recurrent_values(&mut self) {
        for node in &mut self.nodes {
            node.store_recurrent_values();
        }
    }

    fn retrieve_recurrent_values(&mut self) -> Result<()> {
        // All or nothing, so the nodes' histories stay in step.
        if self.nodes.iter().any(|node| node.stored_steps() == 0) {
            return Err(Error::HistoryUnderflow);
        }
        for node in &mut self.nodes {
            node.last_recurrent_value()?;
        }
        Ok(())
    }
}
