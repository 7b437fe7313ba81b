//! End-to-end domain reduction: restricted splines must agree with the
//! original everywhere inside their box, and recursive bisection must tile
//! the domain with exact restrictions.

use multispline::{BasisType, SplitConfig, Spline, bisect_domains};
use ndarray::{Array1, Array2, array};

fn camelback(x: f64, y: f64) -> f64 {
    (4.0 - 2.1 * x * x + x.powi(4) / 3.0) * x * x + x * y + (-4.0 + 4.0 * y * y) * y * y
}

fn fitted(basis_type: BasisType) -> Spline {
    let n = 20;
    let mut points = Array2::zeros((n * n, 2));
    let mut values = Array1::zeros(n * n);
    let mut row = 0;
    for i in 0..n {
        for j in 0..n {
            let x = 2.0 * i as f64 / (n - 1) as f64;
            let y = 2.0 * j as f64 / (n - 1) as f64;
            points[[row, 0]] = x;
            points[[row, 1]] = y;
            values[row] = camelback(x, y);
            row += 1;
        }
    }
    Spline::fit(points.view(), values.view(), basis_type).unwrap()
}

fn assert_agrees_on_box(original: &Spline, restricted: &Spline, steps: usize, tol: f64) {
    let lower = restricted.domain_lower_bound();
    let upper = restricted.domain_upper_bound();
    for i in 0..=steps {
        for j in 0..=steps {
            let x = array![
                lower[0] + (upper[0] - lower[0]) * i as f64 / steps as f64,
                lower[1] + (upper[1] - lower[1]) * j as f64 / steps as f64
            ];
            let a = original.eval(x.view()).unwrap();
            let b = restricted.eval(x.view()).unwrap();
            assert!(
                (a - b).abs() < tol,
                "mismatch at {x:?}: original {a}, restricted {b}"
            );
        }
    }
}

#[test]
fn single_reduction_is_exact() {
    let original = fitted(BasisType::CubicFree);
    let mut reduced = original.clone();
    reduced.reduce_domain(&[0.3, 0.5], &[1.7, 1.5]).unwrap();

    assert_eq!(reduced.domain_lower_bound(), vec![0.3, 0.5]);
    assert_eq!(reduced.domain_upper_bound(), vec![1.7, 1.5]);
    assert_agrees_on_box(&original, &reduced, 40, 1e-8);

    // Evaluation outside the reduced box must now fail.
    assert!(reduced.eval(array![0.1, 1.0].view()).is_err());
    assert!(reduced.eval(array![1.0, 1.8].view()).is_err());
}

#[test]
fn reduction_composes() {
    let original = fitted(BasisType::CubicFree);
    let mut once = original.clone();
    once.reduce_domain(&[0.2, 0.2], &[1.8, 1.8]).unwrap();
    let mut twice = once.clone();
    twice.reduce_domain(&[0.6, 0.6], &[1.4, 1.4]).unwrap();

    let mut direct = original.clone();
    direct.reduce_domain(&[0.6, 0.6], &[1.4, 1.4]).unwrap();

    assert_agrees_on_box(&direct, &twice, 30, 1e-8);
    assert_eq!(twice.domain_lower_bound(), vec![0.6, 0.6]);
    assert_eq!(twice.domain_upper_bound(), vec![1.4, 1.4]);
}

#[test]
fn bisection_covers_the_domain_with_exact_pieces() {
    let original = fitted(BasisType::CubicFree);
    let config = SplitConfig { min_span: 0.5 };
    let leaves = bisect_domains(&original, &config).unwrap();
    // [0,2]^2 halves twice per dimension before extents reach 0.5.
    assert_eq!(leaves.len(), 16);

    let mut volume = 0.0;
    for leaf in &leaves {
        let lower = leaf.domain_lower_bound();
        let upper = leaf.domain_upper_bound();
        volume += (upper[0] - lower[0]) * (upper[1] - lower[1]);
        assert_agrees_on_box(&original, leaf, 10, 1e-8);
    }
    assert!((volume - 4.0).abs() < 1e-10, "leaves do not tile: {volume}");
}

#[test]
fn bisection_with_default_config_terminates_on_small_domains() {
    let original = fitted(BasisType::Linear);
    let mut small = original.clone();
    small.reduce_domain(&[0.96, 0.96], &[1.04, 1.04]).unwrap();

    // Extents already below min_span: the spline itself is the only leaf.
    let leaves = bisect_domains(&small, &SplitConfig::default()).unwrap();
    assert_eq!(leaves.len(), 1);
    assert!(leaves[0].approx_eq(&small, 0.0));
}
