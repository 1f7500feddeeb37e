use super::*;

#[test]
fn test_validate_boundary() {
    let x = -1.0;
    assert!(validate_boundary(x, "x", -2.0, BoundType::Upper).is_err());
    assert!(validate_boundary(x, "x", 1.0, BoundType::Lower).is_err());
    assert!(validate_boundary(x, "x", 0.0, BoundType::Upper).is_ok());
    assert!(validate_boundary(x, "x", -1.0, BoundType::Lower).is_ok());
}

#[test]
fn test_validate_range_rejects_outside_for_every_range_type() {
    for range_type in [
        RangeType::Closed,
        RangeType::ClosedOpen,
        RangeType::OpenClosed,
        RangeType::Open,
    ] {
        let err = validate_range(-1.0, "x", 0.0, 1.0, range_type).unwrap_err();
        assert!(matches!(err, GradwiseError::ConfigurationError(_)));
    }
}

#[test]
fn test_validate_range_endpoints() {
    assert!(validate_range(1.0, "x", 0.0, 1.0, RangeType::Closed).is_ok());
    assert!(validate_range(1.0, "x", 0.0, 1.0, RangeType::ClosedOpen).is_err());
    assert!(validate_range(0.0, "x", 0.0, 1.0, RangeType::OpenClosed).is_err());
    assert!(validate_range(0.5, "x", 0.0, 1.0, RangeType::Open).is_ok());
}

#[test]
fn test_validate_learning_rate_and_betas() {
    assert!(validate_learning_rate(1e-3).is_ok());
    assert!(validate_learning_rate(0.0).is_err());
    assert!(validate_learning_rate(f32::NAN).is_err());

    assert!(validate_betas(&[0.9, 0.999]).is_ok());
    let err = validate_betas(&[0.9, 1.0]).unwrap_err();
    assert!(err.to_string().contains("beta2"));
}
