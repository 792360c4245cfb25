use std::cell::RefCell;
use std::rc::Rc;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use nalgebra::{DMatrix, DVector, Matrix3xX, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use taskspace::kinematics::{DerivativeOrder, KinematicsProvider, KinematicsSnapshot, Pose};
use taskspace::tasks::viz::{DebugSink, MeshMarkers};
use taskspace::tasks::{InteractionMesh, TaskFunction};
use taskspace::ConfigurationError;

/// Synthetic kinematic chain with a dense, smooth configuration-to-point
/// map and closed-form per-effector Jacobians:
///
///   P_j = ( sum_k A[j][k] sin(x_k + p[j][k]),
///           sum_k B[j][k] cos(x_k),
///           sum_k C[j][k] x_k^2 )
struct SyntheticChain {
    a: Vec<Vec<f64>>,
    b: Vec<Vec<f64>>,
    c: Vec<Vec<f64>>,
    phase: Vec<Vec<f64>>,
    n: usize,
}

impl SyntheticChain {
    fn random(m: usize, n: usize, rng: &mut StdRng) -> Self {
        let mut coeffs = || -> Vec<Vec<f64>> {
            (0..m)
                .map(|_| (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect())
                .collect()
        };
        let a = coeffs();
        let b = coeffs();
        let c = coeffs();
        let phase = coeffs();
        Self { a, b, c, phase, n }
    }
}

impl KinematicsProvider for SyntheticChain {
    fn effector_count(&self) -> usize {
        self.a.len()
    }

    fn compute(
        &self,
        x: &[f64],
        order: DerivativeOrder,
    ) -> taskspace::Result<KinematicsSnapshot> {
        assert_eq!(x.len(), self.n);
        let m = self.effector_count();
        let mut snapshot = KinematicsSnapshot::default();
        for j in 0..m {
            let mut p = Vector3::zeros();
            for k in 0..self.n {
                p.x += self.a[j][k] * (x[k] + self.phase[j][k]).sin();
                p.y += self.b[j][k] * x[k].cos();
                p.z += self.c[j][k] * x[k] * x[k];
            }
            snapshot.poses.push(Pose::from_position(p));
        }
        if order.wants_jacobian() {
            for j in 0..m {
                let mut block = Matrix3xX::zeros(self.n);
                for k in 0..self.n {
                    block[(0, k)] = self.a[j][k] * (x[k] + self.phase[j][k]).cos();
                    block[(1, k)] = -self.b[j][k] * x[k].sin();
                    block[(2, k)] = 2.0 * self.c[j][k] * x[k];
                }
                snapshot.jacobians.push(block);
            }
        }
        Ok(snapshot)
    }
}

fn random_weights(m: usize, rng: &mut StdRng) -> DMatrix<f64> {
    let mut w = DMatrix::zeros(m, m);
    for j in 0..m {
        for l in 0..m {
            if j != l {
                w[(j, l)] = rng.gen_range(0.1..2.0);
            }
        }
    }
    w
}

#[test]
fn worked_three_point_example() {
    let points = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
    ];
    let weights = DMatrix::from_element(3, 3, 1.0);
    let phi = InteractionMesh::compute_laplace(&points, &weights).unwrap();

    // wsum(0) = 2, both neighbors at distance 1.
    assert_relative_eq!(phi[0], -0.5, epsilon = 1e-12);
    assert_relative_eq!(phi[1], -0.5, epsilon = 1e-12);
    assert_relative_eq!(phi[2], 0.0, epsilon = 1e-12);

    // wsum(1) = 1 + 1/sqrt(2); the far neighbor's coefficient is sqrt(2)-1.
    let far = 2.0_f64.sqrt() - 1.0;
    assert_relative_eq!(phi[3], 1.0, epsilon = 1e-12);
    assert_relative_eq!(phi[4], -far, epsilon = 1e-12);
    assert_relative_eq!(phi[5], 0.0, epsilon = 1e-12);

    // P2 mirrors P1.
    assert_relative_eq!(phi[6], -far, epsilon = 1e-12);
    assert_relative_eq!(phi[7], 1.0, epsilon = 1e-12);
    assert_relative_eq!(phi[8], 0.0, epsilon = 1e-12);
}

#[test]
fn laplace_is_translation_invariant() {
    let mut rng = StdRng::seed_from_u64(7);
    let m = 5;
    let points: Vec<Vector3<f64>> = (0..m)
        .map(|_| {
            Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
        })
        .collect();
    let weights = random_weights(m, &mut rng);
    let shift = Vector3::new(3.7, -12.0, 0.25);
    let shifted: Vec<Vector3<f64>> = points.iter().map(|p| p + shift).collect();

    let phi = InteractionMesh::compute_laplace(&points, &weights).unwrap();
    let phi_shifted = InteractionMesh::compute_laplace(&shifted, &weights).unwrap();
    for i in 0..3 * m {
        assert_abs_diff_eq!(phi[i], phi_shifted[i], epsilon = 1e-9);
    }
}

#[test]
fn zero_weights_yield_plain_positions() {
    let points = [
        Vector3::new(0.3, 0.1, -0.2),
        Vector3::new(-1.0, 0.5, 0.0),
        Vector3::new(0.0, 2.0, 1.0),
    ];
    let weights = DMatrix::zeros(3, 3);
    let phi = InteractionMesh::compute_laplace(&points, &weights).unwrap();
    for (j, p) in points.iter().enumerate() {
        assert_eq!(phi[3 * j], p.x);
        assert_eq!(phi[3 * j + 1], p.y);
        assert_eq!(phi[3 * j + 2], p.z);
    }
}

#[test]
fn single_point_keeps_its_position() {
    let points = [Vector3::new(1.0, -2.0, 3.0)];
    let weights = DMatrix::from_element(1, 1, 1.0);
    let phi = InteractionMesh::compute_laplace(&points, &weights).unwrap();
    assert_eq!(phi.as_slice(), &[1.0, -2.0, 3.0]);
}

#[test]
fn isolated_point_keeps_its_position() {
    let points = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(5.0, 5.0, 5.0),
    ];
    // Point 2 has no weighted neighbor; points 0 and 1 ignore it.
    let mut weights = DMatrix::from_element(3, 3, 1.0);
    weights[(2, 0)] = 0.0;
    weights[(2, 1)] = 0.0;
    let phi = InteractionMesh::compute_laplace(&points, &weights).unwrap();
    assert_eq!(&phi.as_slice()[6..9], &[5.0, 5.0, 5.0]);
}

#[test]
fn coincident_points_are_omitted_from_the_mesh() {
    let points = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(2.0, 0.0, 0.0),
    ];
    let weights = DMatrix::from_element(3, 3, 1.0);
    let phi = InteractionMesh::compute_laplace(&points, &weights).unwrap();
    // Point 0's only valid neighbor is point 2.
    assert_relative_eq!(phi[0], -2.0, epsilon = 1e-12);
    assert_relative_eq!(phi[1], 0.0, epsilon = 1e-12);
    assert_relative_eq!(phi[2], 0.0, epsilon = 1e-12);
}

#[test]
fn analytic_jacobian_matches_central_differences() {
    let mut rng = StdRng::seed_from_u64(42);
    let m = 4;
    let n = 5;
    let chain = SyntheticChain::random(m, n, &mut rng);
    let mut mesh = InteractionMesh::new(m);
    mesh.set_weights(&random_weights(m, &mut rng)).unwrap();
    // One dropped pair exercises the omission rule inside the derivative.
    mesh.set_weight(0, 1, 0.0).unwrap();
    mesh.set_weight(1, 0, 0.0).unwrap();

    let x: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let kin = chain.compute(&x, DerivativeOrder::First).unwrap();
    let mut phi = DVector::zeros(3 * m);
    let mut jacobian = DMatrix::zeros(3 * m, n);
    mesh.value_and_jacobian(&kin, &mut phi, &mut jacobian)
        .unwrap();

    let h = 1e-6;
    let mut phi_plus = DVector::zeros(3 * m);
    let mut phi_minus = DVector::zeros(3 * m);
    for k in 0..n {
        let mut xp = x.clone();
        let mut xm = x.clone();
        xp[k] += h;
        xm[k] -= h;
        mesh.value(
            &chain.compute(&xp, DerivativeOrder::None).unwrap(),
            &mut phi_plus,
        )
        .unwrap();
        mesh.value(
            &chain.compute(&xm, DerivativeOrder::None).unwrap(),
            &mut phi_minus,
        )
        .unwrap();
        for r in 0..3 * m {
            let fd = (phi_plus[r] - phi_minus[r]) / (2.0 * h);
            assert_relative_eq!(jacobian[(r, k)], fd, epsilon = 1e-8, max_relative = 1e-5);
        }
    }
}

#[test]
fn value_buffer_size_is_checked_before_writing() {
    let chain = SyntheticChain::random(3, 2, &mut StdRng::seed_from_u64(1));
    let mesh = InteractionMesh::new(3);
    let kin = chain.compute(&[0.1, 0.2], DerivativeOrder::None).unwrap();
    let mut phi = DVector::zeros(8);
    let err = mesh.value(&kin, &mut phi).unwrap_err();
    match err {
        ConfigurationError::SizeMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, 9);
            assert_eq!(actual, 8);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn jacobian_buffer_shape_is_checked() {
    let chain = SyntheticChain::random(3, 2, &mut StdRng::seed_from_u64(1));
    let mesh = InteractionMesh::new(3);
    let kin = chain.compute(&[0.1, 0.2], DerivativeOrder::First).unwrap();
    let mut phi = DVector::zeros(9);
    let mut jacobian = DMatrix::zeros(9, 3);
    assert!(matches!(
        mesh.value_and_jacobian(&kin, &mut phi, &mut jacobian),
        Err(ConfigurationError::ShapeMismatch { .. })
    ));
}

#[derive(Default)]
struct RecordingSink {
    published: RefCell<Vec<MeshMarkers>>,
}

impl DebugSink for RecordingSink {
    fn publish(&self, markers: &MeshMarkers) {
        self.published.borrow_mut().push(markers.clone());
    }
}

#[test]
fn debug_sink_receives_markers_without_changing_values() {
    let chain = SyntheticChain::random(3, 2, &mut StdRng::seed_from_u64(3));
    let x = [0.4, -0.7];
    let kin = chain.compute(&x, DerivativeOrder::None).unwrap();

    let mut mesh = InteractionMesh::new(3);
    mesh.set_weight(0, 2, 0.0).unwrap();
    mesh.set_weight(2, 0, 0.0).unwrap();
    let sink = Rc::new(RecordingSink::default());
    mesh.attach_debug_sink(Rc::clone(&sink) as Rc<dyn DebugSink>);
    mesh.set_debug(true);

    let mut phi = DVector::zeros(9);
    mesh.value(&kin, &mut phi).unwrap();

    let published = sink.published.borrow();
    assert_eq!(published.len(), 1);
    let markers = &published[0];
    assert_eq!(markers.points.len(), 3);
    assert_eq!(markers.laplace.len(), 3);
    // The zeroed pair (0,2) is not an edge; (0,1) and (1,2) are.
    assert_eq!(markers.edges, vec![(0, 1), (1, 2)]);

    // Values match a mesh without any sink attached (weights differ only
    // in the dropped pair, so compare against a second silent mesh).
    let mut silent = InteractionMesh::new(3);
    silent.set_weight(0, 2, 0.0).unwrap();
    silent.set_weight(2, 0, 0.0).unwrap();
    let mut phi_silent = DVector::zeros(9);
    silent.value(&kin, &mut phi_silent).unwrap();
    assert_eq!(phi, phi_silent);
}

#[test]
fn goal_laplace_matches_compute_laplace() {
    let points = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
    ];
    let poses: Vec<Pose> = points.iter().map(|p| Pose::from_position(*p)).collect();
    let weights = DMatrix::from_element(3, 3, 1.0);
    let direct = InteractionMesh::compute_laplace(&points, &weights).unwrap();
    let from_poses = InteractionMesh::goal_laplace(&poses, &weights).unwrap();
    assert_eq!(direct, from_poses);
}
