use crate::error::GradwiseError;
use crate::tensor::{create, Tensor};
use approx::assert_relative_eq;

#[test]
fn test_new_rejects_mismatched_length() {
    let result = Tensor::new(vec![1.0, 2.0, 3.0], vec![2, 2]);
    assert!(matches!(
        result,
        Err(GradwiseError::TensorCreationError { data_len: 3, .. })
    ));
}

#[test]
fn test_scalar_shape_holds_one_element() -> Result<(), GradwiseError> {
    let t = Tensor::new(vec![4.0], vec![])?;
    assert_eq!(t.numel(), 1);
    assert_eq!(t.rank(), 0);
    Ok(())
}

#[test]
fn test_clone_does_not_alias() -> Result<(), GradwiseError> {
    let original = Tensor::new(vec![1.0, 2.0], vec![2])?;
    let mut copy = original.clone();
    copy.data_mut()[0] = 10.0;
    assert_eq!(original.data(), &[1.0, 2.0]);
    Ok(())
}

#[test]
fn test_relative_eq_respects_shape() -> Result<(), GradwiseError> {
    let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2])?;
    let b = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![4])?;
    assert!(!approx::relative_eq!(a, b));
    let c = Tensor::new(vec![1.0, 2.0, 3.0, 4.0 + 1e-7], vec![2, 2])?;
    assert_relative_eq!(a, c, epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_serde_round_trip_and_validation() -> Result<(), GradwiseError> {
    let t = create::full(&[2, 3], 0.25);
    let json = serde_json::to_string(&t).expect("serialize");
    let back: Tensor = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, t);

    let broken = r#"{"shape":[2,2],"data":[1.0]}"#;
    assert!(serde_json::from_str::<Tensor>(broken).is_err());
    Ok(())
}
