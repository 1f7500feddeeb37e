use super::*;
use crate::optimizer::Optimizer;
use crate::sgd::SgdConfig;
use crate::state::ParamId;
use approx::assert_relative_eq;
use gradwise_core::{Parameter, SharedParameter, SparseTensor};

fn trac_sgd(lr: f32) -> Result<Trac<Sgd>, GradwiseError> {
    Trac::new(
        Sgd::new(SgdConfig {
            lr,
            ..SgdConfig::default()
        })?,
        TracConfig::default(),
    )
}

fn dense(data: Vec<f32>) -> Result<Gradient, GradwiseError> {
    let len = data.len();
    Ok(Gradient::from(Tensor::new(data, vec![len])?))
}

#[test]
fn test_erfi_series() {
    assert_eq!(erfi(0.0, 128), 0.0);
    assert_relative_eq!(erfi(0.5, 128), 0.614_952_094_696_511, max_relative = 1e-12);
    assert_relative_eq!(erfi(1.0, 128), 1.650_425_758_797_542_8, max_relative = 1e-12);
    assert_relative_eq!(erfi(-1.0, 128), -erfi(1.0, 128));
}

#[test]
fn test_first_step_stays_at_reference() -> Result<(), GradwiseError> {
    let rule = trac_sgd(0.1)?;
    let mut param = Tensor::new(vec![1.0, -1.0], vec![2])?;
    let mut state = rule.init_state(&param);

    rule.update(&mut param, &dense(vec![1.0, 2.0])?, &mut state, 0.1)?;

    assert_eq!(state.step, 1);
    assert_eq!(param.data(), &[1.0, -1.0]);
    assert_relative_eq!(state.delta, Tensor::new(vec![-0.1, -0.2], vec![2])?, epsilon = 1e-6);
    assert_eq!(state.scale(), 0.0);
    assert_eq!(state.inner.step, 1);
    Ok(())
}

#[test]
fn test_aligned_gradients_grow_every_tracker() -> Result<(), GradwiseError> {
    let rule = trac_sgd(0.1)?;
    let mut param = Tensor::new(vec![1.0], vec![1])?;
    let mut state = rule.init_state(&param);

    rule.update(&mut param, &dense(vec![1.0])?, &mut state, 0.1)?;
    rule.update(&mut param, &dense(vec![1.0])?, &mut state, 0.1)?;

    // h = -0.1, so sigma / sqrt(2 variance) is 1/sqrt(2) and each tracker
    // lands on s_prev.
    for &s in &state.s {
        assert_relative_eq!(s, 1e-8, max_relative = 1e-5);
    }
    assert_relative_eq!(state.scale(), 6e-8, max_relative = 1e-5);
    assert_relative_eq!(state.sigma[0], 0.1, max_relative = 1e-6);
    let expected = 1.0 + state.scale() * state.delta.data()[0] as f64;
    assert_relative_eq!(param.data()[0], expected as f32);
    Ok(())
}

#[test]
fn test_reversed_gradient_never_scales_below_zero() -> Result<(), GradwiseError> {
    let rule = trac_sgd(0.1)?;
    let mut param = Tensor::new(vec![0.0], vec![1])?;
    let mut state = rule.init_state(&param);

    for g in [1.0, 1.0, 1.0, -1.0] {
        rule.update(&mut param, &dense(vec![g])?, &mut state, 0.1)?;
    }

    let tracker_sum: f64 = state.s.iter().sum();
    assert!(tracker_sum < 0.0, "tracker sum {} should have turned negative", tracker_sum);
    assert_eq!(state.scale(), 0.0);
    assert_relative_eq!(state.delta.data()[0], -0.2, epsilon = 1e-6);
    assert_eq!(param.data(), state.theta_ref.data());
    Ok(())
}

#[test]
fn test_sparse_gradient_reaches_base_rule() -> Result<(), GradwiseError> {
    let rule = trac_sgd(0.5)?;
    let mut param = Tensor::new(vec![1.0, 2.0, 3.0], vec![3])?;
    let mut state = rule.init_state(&param);
    let grad = Gradient::from(SparseTensor::new(vec![3], vec![2], vec![1.0])?);

    rule.update(&mut param, &grad, &mut state, 0.5)?;
    rule.update(&mut param, &grad, &mut state, 0.5)?;

    assert_eq!(state.delta.data(), &[0.0, 0.0, -1.0]);
    assert_eq!(&param.data()[..2], &[1.0, 2.0]);
    assert!(state.scale() > 0.0);
    Ok(())
}

#[test]
fn test_opaque_gradient_is_rejected_without_mutation() -> Result<(), GradwiseError> {
    let rule = trac_sgd(0.1)?;
    let mut param = Tensor::new(vec![1.0], vec![1])?;
    let mut state = rule.init_state(&param);
    let grad = Gradient::Opaque {
        layout: "sparse_csr".to_string(),
        shape: vec![1],
    };

    let err = rule.update(&mut param, &grad, &mut state, 0.1).unwrap_err();

    assert!(matches!(err, GradwiseError::UnsupportedGradientLayout { .. }));
    assert_eq!(state, rule.init_state(&param));
    Ok(())
}

#[test]
fn test_tracker_count_must_match_betas() -> Result<(), GradwiseError> {
    let rule = trac_sgd(0.1)?;
    let mut state = rule.init_state(&Tensor::new(vec![1.0], vec![1])?);
    state.variance.pop();
    state.sigma.pop();
    state.s.pop();

    let err = rule.check_state(&state, 3).unwrap_err();
    assert!(matches!(err, GradwiseError::StateSchemaMismatch { ref component, .. } if component.contains('3')));

    let fields = state.to_fields();
    let mut broken = fields.clone();
    broken.insert("s", StateValue::Vector(vec![0.0]));
    let err = TracState::<crate::sgd::SgdState>::from_fields(
        &FieldReader::param("TRAC(SGD)", 0, &broken),
        &[1],
    )
    .unwrap_err();
    assert!(matches!(err, GradwiseError::StateSchemaMismatch { .. }));
    Ok(())
}

#[test]
fn test_config_round_trip_and_validation() -> Result<(), GradwiseError> {
    let rule = trac_sgd(0.1)?;
    assert_eq!(rule.name(), "TRAC(SGD)");
    let config = rule.config();
    let rebuilt = rule.from_config(&FieldReader::config("TRAC(SGD)", &config))?;
    assert_eq!(rebuilt, rule);

    let sgd = Sgd::new(SgdConfig::default())?;
    for bad in [
        TracConfig {
            betas: vec![],
            ..TracConfig::default()
        },
        TracConfig {
            betas: vec![0.9, 1.0],
            ..TracConfig::default()
        },
        TracConfig {
            s_prev: 0.0,
            ..TracConfig::default()
        },
        TracConfig {
            num_coefs: 0,
            ..TracConfig::default()
        },
    ] {
        assert!(matches!(
            Trac::new(sgd.clone(), bad),
            Err(GradwiseError::ConfigurationError(_))
        ));
    }
    Ok(())
}

#[test]
fn test_parameters_do_not_influence_each_other() -> Result<(), GradwiseError> {
    fn run(with_neighbour: bool) -> Result<Vec<f32>, GradwiseError> {
        let first: SharedParameter =
            Parameter::new_unnamed(Tensor::new(vec![1.0, 2.0], vec![2])?).into_shared();
        let mut params = vec![first.clone()];
        if with_neighbour {
            let neighbour = Parameter::new_unnamed(Tensor::new(vec![5.0], vec![1])?).into_shared();
            neighbour.write().unwrap().set_grad(Tensor::new(vec![-3.0], vec![1])?)?;
            params.push(neighbour);
        }
        let mut optimizer = TracOptimizer::new(params, trac_sgd(0.1)?)?;
        for i in 0..5 {
            let g = Tensor::new(vec![1.0 + i as f32, -0.5], vec![2])?;
            first.write().unwrap().set_grad(g)?;
            optimizer.step()?;
        }
        assert!(optimizer.state(ParamId(0)).is_some());
        let values = first.read().unwrap().to_vec();
        Ok(values)
    }

    assert_eq!(run(false)?, run(true)?);
    Ok(())
}
