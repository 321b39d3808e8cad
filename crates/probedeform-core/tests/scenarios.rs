use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use glam::DVec2;
use probedeform_core::{
    weights::euclidean_weight, DeformError, DeformMode, DeformerConfig, ProbeMesh, WeightMode,
    WeightWorker,
};

const EPSILON: f64 = 1e-9;

fn assert_positions_eq(actual: &[DVec2], expected: &[DVec2]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_relative_eq!(a.x, e.x, epsilon = EPSILON);
        assert_relative_eq!(a.y, e.y, epsilon = EPSILON);
    }
}

fn rest_positions(session: &ProbeMesh) -> Vec<DVec2> {
    (0..session.mesh().num_vertices())
        .map(|v| session.mesh().rest_position(v))
        .collect()
}

#[test]
fn rotation_about_the_center_is_counter_clockwise() -> Result<(), DeformError> {
    for deform_mode in [DeformMode::Dlb, DeformMode::MlsRigid] {
        let config = DeformerConfig {
            deform_mode,
            ..Default::default()
        };
        let mut session = ProbeMesh::new(config, 512.0, 512.0)?;
        let id = session.add_probe(0.0, 0.0)?;
        session.set_pose(id, 0.0, 0.0, FRAC_PI_2)?;
        session.deform()?;

        let expected = rest_positions(&session)
            .iter()
            .map(|p| DVec2::new(-p.y, p.x))
            .collect::<Vec<_>>();
        assert_positions_eq(session.positions(), &expected);

        // (d, 0) lands on (0, d)
        let v = session.mesh().closest_vertex(DVec2::new(0.2, 0.0));
        assert_relative_eq!(session.positions()[v].x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(session.positions()[v].y, 0.2, epsilon = EPSILON);
    }
    Ok(())
}

#[test]
fn disjoint_euclidean_probes_move_independently() -> Result<(), DeformError> {
    let config = DeformerConfig {
        weight_mode: WeightMode::Euclidean,
        probe_radius: 0.35,
        ..Default::default()
    };
    let mut session = ProbeMesh::new(config, 400.0, 200.0)?;
    let left = session.add_probe(-0.6, 0.0)?;
    let right = session.add_probe(0.6, 0.0)?;
    session.set_pose_delta(left, 0.0, 0.1, 0.0)?;
    session.set_pose_delta(right, 0.05, 0.0, 0.4)?;
    session.deform()?;

    let left_transform = session.probe(left).unwrap().transform();
    let right_transform = session.probe(right).unwrap().transform();

    let mut seen = [0; 3];
    for (v, rest) in rest_positions(&session).into_iter().enumerate() {
        let expected = if rest.distance(DVec2::new(-0.6, 0.0)) < 0.35 {
            seen[0] += 1;
            left_transform.transform_point(rest)
        } else if rest.distance(DVec2::new(0.6, 0.0)) < 0.35 {
            seen[1] += 1;
            right_transform.transform_point(rest)
        } else {
            seen[2] += 1;
            rest
        };
        let actual = session.positions()[v];
        assert_relative_eq!(actual.x, expected.x, epsilon = EPSILON);
        assert_relative_eq!(actual.y, expected.y, epsilon = EPSILON);
    }
    assert!(seen.iter().all(|count| *count > 0));
    Ok(())
}

#[test]
fn export_then_load_reproduces_deformation() -> Result<(), DeformError> {
    let config = DeformerConfig {
        weight_mode: WeightMode::Biharmonic,
        ..Default::default()
    };
    let mut session = ProbeMesh::new(config.clone(), 300.0, 200.0)?;
    let a = session.add_probe(-0.5, 0.2)?;
    let b = session.add_probe(0.4, -0.1)?;
    session.set_pose_delta(a, 0.1, -0.05, 0.3)?;
    session.set_pose_delta(b, -0.02, 0.1, -0.6)?;
    session.deform()?;

    let records = session.export_probes();
    let mut restored = ProbeMesh::new(config, 300.0, 200.0)?;
    restored.load_probes(&records)?;
    restored.deform()?;

    assert_eq!(restored.export_probes(), records);
    assert_positions_eq(restored.positions(), session.positions());
    Ok(())
}

#[test]
fn deform_is_idempotent() -> Result<(), DeformError> {
    let mut session = ProbeMesh::new(DeformerConfig::default(), 640.0, 480.0)?;
    let a = session.add_probe(-0.3, 0.0)?;
    session.add_probe(0.5, 0.3)?;
    session.set_pose_delta(a, 0.2, 0.1, 1.0)?;

    let first = session.deform()?;
    let second = session.deform()?;
    assert_eq!(first.positions(), second.positions());
    assert!(second.version() > first.version());
    Ok(())
}

#[test]
fn overlapping_probes_share_one_seed() -> Result<(), DeformError> {
    let config = DeformerConfig {
        probe_radius: 0.4,
        ..Default::default()
    };
    let mut session = ProbeMesh::new(config, 100.0, 100.0)?;
    session.add_probe(0.0, 0.0)?;
    session.add_probe(0.05, 0.02)?;

    let weights = session.refresh_weights()?;
    assert_eq!(weights.mode(), WeightMode::Harmonic);
    assert_eq!(weights.fallback_probes(), &[1]);

    let center = session.mesh().closest_vertex(DVec2::ZERO);
    assert_eq!(weights.weight(0, center), 1.0);

    let anchor = DVec2::new(0.05, 0.02);
    for v in 0..session.mesh().num_vertices() {
        let expected = euclidean_weight(session.mesh().rest_position(v), anchor, 0.4);
        assert_relative_eq!(weights.weight(1, v), expected);
    }
    Ok(())
}

#[test]
fn worker_publishes_only_the_newest_request() -> Result<(), DeformError> {
    let worker = WeightWorker::spawn();
    let mut session = ProbeMesh::new(DeformerConfig::default(), 200.0, 200.0)?;

    session.add_probe(-0.5, 0.0)?;
    let superseded = session.weight_job();
    worker.request(superseded.clone());
    session.add_probe(0.5, 0.0)?;
    worker.request(session.weight_job());

    let field = worker
        .wait(Duration::from_secs(30))
        .expect("worker did not finish");
    assert_eq!(field.generation(), session.generation());
    session.install_weights(field)?;
    assert!(!session.weights_stale());

    // a result for the superseded generation is rejected
    let stale = Arc::new(superseded.run());
    assert!(matches!(
        session.install_weights(stale),
        Err(DeformError::StaleWeights { .. })
    ));
    assert!(!session.weights_stale());
    Ok(())
}

#[test]
fn freeze_keeps_the_current_shape() -> Result<(), DeformError> {
    let mut session = ProbeMesh::new(DeformerConfig::default(), 300.0, 300.0)?;
    let a = session.add_probe(-0.4, 0.0)?;
    let b = session.add_probe(0.4, 0.0)?;
    session.set_pose_delta(a, 0.0, 0.2, 0.0)?;
    session.set_pose_delta(b, 0.0, -0.2, 0.5)?;
    session.deform()?;
    let before = session.positions().to_vec();

    session.freeze_probes()?;
    assert_positions_eq(&rest_positions(&session), &before);
    session.deform()?;
    assert_positions_eq(session.positions(), &before);

    let record = session.pose(a)?;
    assert_relative_eq!(record.iy, 0.2);
    assert_relative_eq!(record.y, 0.2);
    Ok(())
}

#[test]
fn restored_pose_restores_output() -> Result<(), DeformError> {
    let mut session = ProbeMesh::new(DeformerConfig::default(), 300.0, 200.0)?;
    let a = session.add_probe(0.1, 0.1)?;
    session.add_probe(-0.6, -0.2)?;
    session.set_pose_delta(a, 0.05, 0.0, 0.2)?;
    session.deform()?;
    let before = session.positions().to_vec();
    let generation = session.generation();

    let snapshot = session.pose(a)?;
    session.set_pose_delta(a, 0.3, -0.3, 1.2)?;
    session.deform()?;
    session.restore_pose(a, &snapshot)?;
    session.deform()?;

    // only the pose changed, the weights are reused
    assert_eq!(session.generation(), generation);
    assert_positions_eq(session.positions(), &before);
    Ok(())
}

#[test]
fn symmetric_probes_mirror_the_deformation() -> Result<(), DeformError> {
    let config = DeformerConfig {
        symmetric: true,
        ..Default::default()
    };
    let mut session = ProbeMesh::new(config, 200.0, 200.0)?;
    let id = session.add_probe(0.4, 0.0)?;
    session.set_pose_delta(id, 0.1, 0.1, 0.3)?;
    session.deform()?;

    // the deformed mesh is symmetric across x = 0
    let mesh = session.mesh();
    for v in 0..mesh.num_vertices() {
        let (row, col) = mesh.row_col(v);
        let mirrored = mesh.vertex_index(row, mesh.cols() - 1 - col);
        let p = session.positions()[v];
        let q = session.positions()[mirrored];
        assert_relative_eq!(p.x, -q.x, epsilon = 1e-6);
        assert_relative_eq!(p.y, q.y, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn full_turn_keeps_the_mesh_intact() -> Result<(), DeformError> {
    let mut session = ProbeMesh::new(DeformerConfig::default(), 300.0, 300.0)?;
    let a = session.add_probe(-0.5, 0.0)?;
    session.add_probe(0.5, 0.0)?;
    for _ in 0..4 {
        session.set_pose_delta(a, 0.0, 0.0, FRAC_PI_2)?;
    }
    session.set_pose_delta(a, 0.05, 0.0, 0.0)?;
    session.deform()?;

    // a full turn is no rotation at all, only the translation is left
    let rest = rest_positions(&session);
    let max_displacement = session
        .positions()
        .iter()
        .zip(&rest)
        .map(|(p, r)| p.distance(*r))
        .fold(0.0, f64::max);
    assert!(max_displacement <= 0.05 + EPSILON, "{max_displacement}");
    Ok(())
}
