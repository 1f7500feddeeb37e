use gradwise_core::{tensor, GradwiseError, Parameter, SharedParameter, Tensor};
use gradwise_optim::Optimizer;
use rand::rngs::StdRng;
use rand::SeedableRng;

// Shared by several test crates; each one only uses part of it.

/// Shapes of the toy model every round-trip test trains.
#[allow(dead_code)]
pub const SHAPES: [&[usize]; 2] = [&[3, 4], &[5]];

#[allow(dead_code)]
pub fn create_param(data: Vec<f32>, shape: Vec<usize>) -> Result<SharedParameter, GradwiseError> {
    Ok(Parameter::new_unnamed(Tensor::new(data, shape)?).into_shared())
}

/// Parameters with seeded normal initial values.
#[allow(dead_code)]
pub fn seeded_params(seed: u64) -> Vec<SharedParameter> {
    let mut rng = StdRng::seed_from_u64(seed);
    SHAPES
        .iter()
        .map(|shape| Parameter::new_unnamed(tensor::randn(shape, &mut rng)).into_shared())
        .collect()
}

/// `steps` gradients per parameter, drawn from a seeded generator.
#[allow(dead_code)]
pub fn gradient_stream(seed: u64, steps: usize) -> Vec<Vec<Tensor>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..steps)
        .map(|_| SHAPES.iter().map(|shape| tensor::randn(shape, &mut rng)).collect())
        .collect()
}

/// Copies of the current parameter values, as fresh parameters.
#[allow(dead_code)]
pub fn clone_params(params: &[SharedParameter]) -> Vec<SharedParameter> {
    params
        .iter()
        .map(|p| Parameter::new_unnamed(p.read().unwrap().tensor().clone()).into_shared())
        .collect()
}

#[allow(dead_code)]
pub fn values(params: &[SharedParameter]) -> Vec<Tensor> {
    params.iter().map(|p| p.read().unwrap().tensor().clone()).collect()
}

/// Sets each step's gradients and runs the optimizer once per step.
#[allow(dead_code)]
pub fn train<O: Optimizer>(
    optimizer: &mut O,
    params: &[SharedParameter],
    grads: &[Vec<Tensor>],
) -> Result<(), GradwiseError> {
    for step_grads in grads {
        for (param, grad) in params.iter().zip(step_grads) {
            param.write().unwrap().set_grad(grad.clone())?;
        }
        optimizer.step()?;
    }
    Ok(())
}
