//! Fully recurrent neural network layers trained with backpropagation through time.

pub mod activation;
pub mod config;
pub mod error;
pub mod layer;
pub mod node;
pub mod trainer;

pub use activation::ActivationKind;
pub use config::{LayerConfig, LearningMode, TrainingConfig};
pub use error::{Error, Result};
pub use layer::{NetworkLayer, RecurrentLayer};
pub use node::Node;

#[macro_export]
macro_rules! assert_rel_eq_arr1 {
    ($actual:expr, $expected:expr) => {
        assert_eq!($actual.shape(), $expected.shape());
        ndarray::Zip::from(&$actual)
            .and(&$expected)
            .for_each(|v, w| {
                assert_relative_eq!(v, w);
            });
    };
    ($actual:expr, $expected:expr, $($opt:tt)+) => {
        assert_eq!($actual.shape(), $expected.shape());
        ndarray::Zip::from(&$actual)
            .and(&$expected)
            .for_each(|v, w| {
                assert_relative_eq!(v, w, $($opt)+);
            });
    };
}
