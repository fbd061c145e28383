//! Eager and planned engines must agree on every input.

use std::sync::Arc;

use planned_inference::buffer_plan::PlannerOptions;
use planned_inference::input::tile_input;
use planned_inference::{
    Activation, BufferPlan, EagerEngine, ModelDims, ModelSpec, PlannedEngine, Verifier,
};
use proptest::prelude::*;

fn activation_strategy() -> impl Strategy<Value = Activation> {
    prop_oneof![
        Just(Activation::Relu),
        Just(Activation::Sigmoid),
        Just(Activation::Tanh),
    ]
}

proptest! {
    #[test]
    fn prop_engines_produce_identical_outputs(
        input_dim in 1usize..7,
        hidden_dim in 1usize..13,
        output_dim in 1usize..7,
        batch in 1usize..6,
        seed in any::<u64>(),
        fuse in any::<bool>(),
        activation in activation_strategy(),
        values in proptest::collection::vec(-2.0f32..2.0, 1..9),
    ) {
        let dims = ModelDims::new(input_dim, hidden_dim, output_dim);
        let model = Arc::new(ModelSpec::seeded(dims, seed).unwrap().with_activation(activation));
        let input = tile_input(&values, batch, input_dim).unwrap();

        let mut eager = EagerEngine::new(model.clone()).unwrap();
        let expected = eager.run(&input).unwrap();

        let options = PlannerOptions { fuse_elementwise: fuse };
        let plan = BufferPlan::build_with(&model, batch, options).unwrap();
        let mut planned = PlannedEngine::new(model, plan).unwrap();
        let actual = planned.run(&input).unwrap();

        prop_assert_eq!(expected.len(), batch * output_dim);
        prop_assert_eq!(expected.as_slice(), actual);
        let result = Verifier::default().compare(&expected, actual).unwrap();
        prop_assert!(result.passed);
    }
}

#[test]
fn test_repeated_planned_runs_are_bit_identical() {
    let model = Arc::new(ModelSpec::seeded(ModelDims::new(16, 64, 8), 42).unwrap());
    let input = tile_input(&[0.5, 1.2, -0.3], 4, 16).unwrap();
    let plan = BufferPlan::build(&model, 4).unwrap();
    let mut engine = PlannedEngine::new(model, plan).unwrap();

    let first = engine.run(&input).unwrap().to_vec();
    for _ in 0..5 {
        let again = engine.run(&input).unwrap();
        assert!(
            first
                .iter()
                .zip(again)
                .all(|(a, b)| a.to_bits() == b.to_bits())
        );
    }
}

#[test]
fn test_different_inputs_do_not_leak_between_runs() {
    let model = Arc::new(ModelSpec::seeded(ModelDims::new(6, 24, 3), 9).unwrap());
    let plan = BufferPlan::build(&model, 2).unwrap();
    let mut planned = PlannedEngine::new(model.clone(), plan).unwrap();
    let mut eager = EagerEngine::new(model).unwrap();

    let a = tile_input(&[1.0, -1.0], 2, 6).unwrap();
    let b = tile_input(&[0.25, 3.0, -0.5], 2, 6).unwrap();

    planned.run(&a).unwrap();
    let planned_b = planned.run(&b).unwrap().to_vec();
    assert_eq!(planned_b, eager.run(&b).unwrap());
}

#[test]
fn test_known_answer() {
    // w1 (2x2) = [[1, -1], [2, 0.5]], b1 = [0, 1]; relu; w2 (2x1) = [[1], [2]], b2 = [-1]
    let model = Arc::new(
        ModelSpec::new(
            ModelDims::new(2, 2, 1),
            &[1.0, -1.0, 2.0, 0.5],
            vec![0.0, 1.0],
            &[1.0, 2.0],
            vec![-1.0],
        )
        .unwrap(),
    );
    let input = planned_inference::Batch::new(vec![1.0, 1.0, -1.0, 0.0], 2).unwrap();

    // row 0: hidden = [3, 0.5] -> relu [3, 0.5] -> 3 + 1 - 1 = 3
    // row 1: hidden = [-1, 2] -> relu [0, 2] -> 0 + 4 - 1 = 3
    let mut eager = EagerEngine::new(model.clone()).unwrap();
    assert_eq!(eager.run(&input).unwrap(), vec![3.0, 3.0]);

    let plan = BufferPlan::build(&model, 2).unwrap();
    let mut planned = PlannedEngine::new(model, plan).unwrap();
    assert_eq!(planned.run(&input).unwrap(), &[3.0f32, 3.0]);
}
