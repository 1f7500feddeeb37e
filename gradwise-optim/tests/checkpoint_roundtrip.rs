mod common;

use common::{clone_params, gradient_stream, seeded_params, train, values};
use gradwise_core::GradwiseError;
use gradwise_optim::{
    Focus, FocusConfig, Optimizer, OrthoGrad, OrthoGradConfig, Ranger25, Ranger25Config,
    RuleOptimizer, Sgd, SgdConfig, Snapshot, Trac, TracConfig, UpdateRule,
};

const N: usize = 7;
const M: usize = 6;

/// Trains `N + M` steps straight through, and `N` steps, snapshot, restore
/// into a fresh optimizer over copied parameters, then `M` more. Both runs
/// must agree bit for bit.
fn assert_resumes_exactly<R, F>(make_rule: F) -> Result<(), GradwiseError>
where
    R: UpdateRule,
    F: Fn() -> Result<R, GradwiseError>,
{
    let grads = gradient_stream(11, N + M);

    let straight = seeded_params(3);
    let mut uninterrupted = RuleOptimizer::new(straight.clone(), make_rule()?)?;
    train(&mut uninterrupted, &straight, &grads)?;

    let first_half = seeded_params(3);
    let mut interrupted = RuleOptimizer::new(first_half.clone(), make_rule()?)?;
    train(&mut interrupted, &first_half, &grads[..N])?;
    let snapshot = interrupted.state_dict()?;
    drop(interrupted);

    let second_half = clone_params(&first_half);
    let mut resumed = RuleOptimizer::new(second_half.clone(), make_rule()?)?;
    resumed.load_state_dict(&snapshot)?;
    assert_eq!(resumed.state_dict()?, snapshot);
    train(&mut resumed, &second_half, &grads[N..])?;

    assert_eq!(values(&second_half), values(&straight));
    assert_eq!(resumed.state_dict()?, uninterrupted.state_dict()?);
    Ok(())
}

fn sgd_momentum() -> Result<Sgd, GradwiseError> {
    Sgd::new(SgdConfig {
        lr: 0.05,
        momentum: 0.9,
        ..SgdConfig::default()
    })
}

#[test]
fn test_focus_resumes_exactly() -> Result<(), GradwiseError> {
    assert_resumes_exactly(|| {
        Focus::new(FocusConfig {
            weight_decay: 0.01,
            ..FocusConfig::default()
        })
    })
}

#[test]
fn test_orthograd_focus_resumes_exactly() -> Result<(), GradwiseError> {
    assert_resumes_exactly(|| OrthoGrad::new(Focus::new(FocusConfig::default())?, OrthoGradConfig::default()))
}

#[test]
fn test_trac_resumes_exactly() -> Result<(), GradwiseError> {
    assert_resumes_exactly(|| Trac::new(sgd_momentum()?, TracConfig::default()))
}

#[test]
fn test_ranger25_resumes_exactly() -> Result<(), GradwiseError> {
    // N + M crosses two lookahead merges, one on each side of the restore.
    assert_resumes_exactly(|| {
        Ranger25::new(Ranger25Config {
            t_alpha_beta3: Some(20),
            ..Ranger25Config::default()
        })
    })
}

#[test]
fn test_nested_wrappers_resume_exactly() -> Result<(), GradwiseError> {
    assert_resumes_exactly(|| {
        OrthoGrad::new(
            Trac::new(sgd_momentum()?, TracConfig::default())?,
            OrthoGradConfig {
                rescale: true,
                ..OrthoGradConfig::default()
            },
        )
    })
}

#[test]
fn test_snapshot_survives_json() -> Result<(), GradwiseError> {
    let params = seeded_params(5);
    let mut optimizer = RuleOptimizer::new(params.clone(), Trac::new(sgd_momentum()?, TracConfig::default())?)?;
    train(&mut optimizer, &params, &gradient_stream(9, 4))?;

    let snapshot = optimizer.state_dict()?;
    let decoded = Snapshot::from_json(&snapshot.to_json()?)?;
    assert_eq!(decoded, snapshot);

    let mut restored =
        RuleOptimizer::new(clone_params(&params), Trac::new(sgd_momentum()?, TracConfig::default())?)?;
    restored.load_state_dict(&decoded)?;
    assert_eq!(restored.state_dict()?, snapshot);
    Ok(())
}
