use recurrent::{
    ActivationKind, Error, LayerConfig, LearningMode, NetworkLayer, RecurrentLayer,
    TrainingConfig,
};

#[test]
fn layer_from_json() {
    let config: LayerConfig =
        serde_json::from_str(r#"{ "num_inputs": 3, "num_nodes": 4, "activation": "SoftMax" }"#)
            .unwrap();
    assert_eq!(config, LayerConfig::new(3, 4, ActivationKind::SoftMax));

    let layer = RecurrentLayer::from_config(&config).unwrap();
    assert_eq!(layer.input_len(), 3);
    assert_eq!(layer.output_len(), 4);
    assert_eq!(layer.activation(), ActivationKind::SoftMax);
    for node in layer.nodes() {
        assert_eq!(node.num_inputs(), 4);
        assert_eq!(node.num_feedback(), 4);
        assert!(node.input_weights().is_none());
    }
}

#[test]
fn missing_fields_take_defaults() {
    let layer: LayerConfig =
        serde_json::from_str(r#"{ "num_inputs": 1, "num_nodes": 2 }"#).unwrap();
    assert_eq!(layer.activation, ActivationKind::Tanh);

    let training: TrainingConfig = serde_json::from_str(r#"{ "mode": "Batch" }"#).unwrap();
    assert_eq!(training.mode, LearningMode::Batch);
    assert_eq!(training.learning_rate, 0.1);
    assert_eq!(training.weight_decay, 1.0);
}

#[test]
fn empty_layer_is_rejected() {
    let config = LayerConfig::new(2, 0, ActivationKind::Identity);
    assert!(matches!(
        RecurrentLayer::from_config(&config),
        Err(Error::InvalidConfig(_))
    ));
}
