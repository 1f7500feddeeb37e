use crate::error::GradwiseError;
use crate::tensor::Tensor;
use approx::assert_relative_eq;

fn t(data: Vec<f32>) -> Tensor {
    let len = data.len();
    Tensor::new(data, vec![len]).expect("Test tensor creation failed")
}

#[test]
fn test_ema_blends_towards_other() -> Result<(), GradwiseError> {
    let mut avg = t(vec![1.0, 0.0]);
    avg.ema_(&t(vec![0.0, 1.0]), 0.9)?;
    assert_relative_eq!(avg.data()[0], 0.9, epsilon = 1e-7);
    assert_relative_eq!(avg.data()[1], 0.1, epsilon = 1e-7);
    Ok(())
}

#[test]
fn test_ema_sq_uses_squares() -> Result<(), GradwiseError> {
    let mut avg = t(vec![0.0, 0.0]);
    avg.ema_sq_(&t(vec![2.0, -3.0]), 0.5)?;
    assert_eq!(avg.data(), &[2.0, 4.5]);
    Ok(())
}

#[test]
fn test_lerp_and_add_scaled() -> Result<(), GradwiseError> {
    let mut slow = t(vec![0.0, 10.0]);
    slow.lerp_(&t(vec![1.0, 0.0]), 0.5)?;
    assert_eq!(slow.data(), &[0.5, 5.0]);

    slow.add_scaled_(&t(vec![1.0, 1.0]), -2.0)?;
    assert_eq!(slow.data(), &[-1.5, 3.0]);
    Ok(())
}

#[test]
fn test_shape_mismatch_leaves_receiver_untouched() {
    let mut a = t(vec![1.0, 2.0]);
    let b = t(vec![1.0, 2.0, 3.0]);
    let err = a.add_(&b).unwrap_err();
    assert!(matches!(err, GradwiseError::ShapeMismatch { .. }));
    assert_eq!(a.data(), &[1.0, 2.0]);
}

#[test]
fn test_scatter_add_touches_only_listed_indices() -> Result<(), GradwiseError> {
    let mut a = t(vec![1.0, 1.0, 1.0, 1.0]);
    a.scatter_add_(&[1, 3], &[2.0, 4.0], -0.5)?;
    assert_eq!(a.data(), &[1.0, 0.0, 1.0, -1.0]);

    let err = a.scatter_add_(&[4], &[1.0], 1.0).unwrap_err();
    assert!(matches!(err, GradwiseError::IndexOutOfBounds { .. }));
    Ok(())
}
