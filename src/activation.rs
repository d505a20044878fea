use serde::{Deserialize, Serialize};

/// Non-linearity applied by every node of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationKind {
    Identity,
    Tanh,
    Sigmoid,
    /// Sigmoid output trained against cross-entropy loss.
    SigmoidCrossEntropy,
    RectifiedLinear,
    SoftSign,
    /// Output-layer only. Nodes produce `exp(sum)`, the layer normalizes.
    SoftMax,
}

impl ActivationKind {
    /// Look up the strategy object implementing this kind.
    pub fn strategy(self) -> &'static dyn Activation {
        match self {
            Self::Identity => &Identity,
            Self::Tanh => &Tanh,
            Self::Sigmoid => &Sigmoid,
            Self::SigmoidCrossEntropy => &SigmoidCrossEntropy,
            Self::RectifiedLinear => &RectifiedLinear,
            Self::SoftSign => &SoftSign,
            Self::SoftMax => &SoftMax,
        }
    }
}

pub trait Activation {
    /// Output of a node whose weighted sum is `sum`.
    fn activate(&self, sum: f64) -> f64;

    /// Derivative of the activation evaluated from its *output*, so the weighted
    /// sum does not have to be kept around.
    /// `None` for activations that only make sense on an output layer.
    fn local_derivative(&self, output: f64) -> Option<f64>;

    /// Derivative of the loss with respect to the weighted sum of an output node.
    /// Defaults to squared error chained through `local_derivative`.
    fn loss_derivative(&self, output: f64, expected: f64) -> f64 {
        2.0 * (output - expected) * self.local_derivative(output).unwrap_or(1.0)
    }
}

pub struct Identity;

impl Activation for Identity {
    fn activate(&self, sum: f64) -> f64 {
        sum
    }

    fn local_derivative(&self, _output: f64) -> Option<f64> {
        Some(1.0)
    }
}

pub struct Tanh;

impl Activation for Tanh {
    fn activate(&self, sum: f64) -> f64 {
        sum.tanh()
    }

    fn local_derivative(&self, output: f64) -> Option<f64> {
        Some(1.0 - output * output)
    }
}

pub struct Sigmoid;

impl Sigmoid {
    fn compute_one(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }
}

impl Activation for Sigmoid {
    fn activate(&self, sum: f64) -> f64 {
        Sigmoid::compute_one(sum)
    }

    fn local_derivative(&self, output: f64) -> Option<f64> {
        Some(output - output * output)
    }
}

/// Cross-entropy loss cancels the sigmoid derivative, leaving `output - expected`.
pub struct SigmoidCrossEntropy;

impl Activation for SigmoidCrossEntropy {
    fn activate(&self, sum: f64) -> f64 {
        Sigmoid::compute_one(sum)
    }

    fn local_derivative(&self, output: f64) -> Option<f64> {
        Some(output - output * output)
    }

    fn loss_derivative(&self, output: f64, expected: f64) -> f64 {
        output - expected
    }
}

pub struct RectifiedLinear;

impl Activation for RectifiedLinear {
    fn activate(&self, sum: f64) -> f64 {
        sum.max(0.0)
    }

    fn local_derivative(&self, output: f64) -> Option<f64> {
        Some(if output < 0.0 { 0.0 } else { 1.0 })
    }
}

pub struct SoftSign;

impl Activation for SoftSign {
    fn activate(&self, sum: f64) -> f64 {
        sum / (1.0 + sum.abs())
    }

    fn local_derivative(&self, output: f64) -> Option<f64> {
        let d = 1.0 - output.abs();
        Some(d * d)
    }
}

pub struct SoftMax;

impl Activation for SoftMax {
    fn activate(&self, sum: f64) -> f64 {
        sum.exp()
    }

    fn local_derivative(&self, _output: f64) -> Option<f64> {
        None
    }

    fn loss_derivative(&self, output: f64, expected: f64) -> f64 {
        output - expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL_KINDS: [ActivationKind; 7] = [
        ActivationKind::Identity,
        ActivationKind::Tanh,
        ActivationKind::Sigmoid,
        ActivationKind::SigmoidCrossEntropy,
        ActivationKind::RectifiedLinear,
        ActivationKind::SoftSign,
        ActivationKind::SoftMax,
    ];

    #[test]
    fn sigmoid_activate() {
        let x = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let expected = [
            0.1192029220221175,
            0.2689414213699951,
            0.5000000000000000,
            0.7310585786300049,
            0.8807970779778823,
        ];
        for (x, e) in x.iter().zip(expected.iter()) {
            assert_relative_eq!(Sigmoid.activate(*x), *e);
        }
    }

    #[test]
    fn sigmoid_derivative_from_output() {
        let x = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let expected = [
            0.1049935854035065,
            0.1966119332414819,
            0.2500000000000000,
            0.1966119332414819,
            0.1049935854035066,
        ];
        for (x, e) in x.iter().zip(expected.iter()) {
            let y = Sigmoid.activate(*x);
            assert_relative_eq!(Sigmoid.local_derivative(y).unwrap(), *e, epsilon = 1e-12);
        }
    }

    #[test]
    fn relu_and_softsign() {
        assert_relative_eq!(RectifiedLinear.activate(-2.0), 0.0);
        assert_relative_eq!(RectifiedLinear.activate(1.5), 1.5);
        assert_relative_eq!(SoftSign.activate(1.0), 0.5);
        assert_relative_eq!(SoftSign.activate(-3.0), -0.75);
        // d/dx x/(1+|x|) at x = 1 is 1/4
        assert_relative_eq!(SoftSign.local_derivative(0.5).unwrap(), 0.25);
    }

    #[test]
    fn fixed_point_at_zero_sum() {
        let expected = [0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 1.0];
        for (kind, e) in ALL_KINDS.iter().zip(expected.iter()) {
            assert_relative_eq!(kind.strategy().activate(0.0), *e);
        }
    }

    #[test]
    fn loss_derivatives() {
        let (out, exp) = (0.5, 1.0);
        assert_relative_eq!(Identity.loss_derivative(out, exp), -1.0);
        assert_relative_eq!(Tanh.loss_derivative(out, exp), -0.75);
        assert_relative_eq!(Sigmoid.loss_derivative(out, exp), -0.25);
        assert_relative_eq!(SigmoidCrossEntropy.loss_derivative(out, exp), -0.5);
        assert_relative_eq!(SoftMax.loss_derivative(out, exp), -0.5);
        assert_relative_eq!(RectifiedLinear.loss_derivative(out, exp), -1.0);
        assert_relative_eq!(SoftSign.loss_derivative(out, exp), -0.25);
    }

    #[test]
    fn softmax_has_no_local_derivative() {
        assert!(SoftMax.local_derivative(0.3).is_none());
        for kind in ALL_KINDS.iter().filter(|k| **k != ActivationKind::SoftMax) {
            assert!(kind.strategy().local_derivative(0.3).is_some());
        }
    }
}
