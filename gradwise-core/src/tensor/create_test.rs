use super::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_filled_constructors() {
    let z = zeros(&[2, 3]);
    assert_eq!(z.shape(), &[2, 3]);
    assert!(z.data().iter().all(|&v| v == 0.0));

    let o = ones(&[4]);
    assert_eq!(o.data(), &[1.0; 4]);

    let f = full(&[], 2.5);
    assert_eq!(f.numel(), 1);
    assert_eq!(f.data(), &[2.5]);
}

#[test]
fn test_zeros_like_keeps_shape() -> Result<(), GradwiseError> {
    let t = Tensor::new(vec![1.0, 2.0, 3.0], vec![1, 3])?;
    let z = zeros_like(&t);
    assert_eq!(z.shape(), t.shape());
    assert_eq!(z.data(), &[0.0; 3]);
    Ok(())
}

#[test]
fn test_randn_is_seeded() {
    let a = randn(&[8], &mut StdRng::seed_from_u64(7));
    let b = randn(&[8], &mut StdRng::seed_from_u64(7));
    let c = randn(&[8], &mut StdRng::seed_from_u64(8));
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_uniform_bounds() -> Result<(), GradwiseError> {
    let mut rng = StdRng::seed_from_u64(1);
    let t = uniform(&[64], -0.5, 0.5, &mut rng)?;
    assert!(t.data().iter().all(|&v| (-0.5..0.5).contains(&v)));

    assert!(matches!(
        uniform(&[2], 1.0, 1.0, &mut rng),
        Err(GradwiseError::InvalidInput(_))
    ));
    Ok(())
}
