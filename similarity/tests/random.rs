use align_core::{
    nalgebra::{Point2, Vector2},
    sample_consensus::Model,
    FeatureMatch, Similarity,
};
use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use similarity::SimilarityEstimator;

const SAMPLE_POINTS: usize = 16;
const RESIDUAL_THRESHOLD: f64 = 1e-6;
const POINT_BOX_SIZE: f64 = 500.0;

#[test]
fn randomized() {
    let mut rng = Pcg64::seed_from_u64(0);
    let successes = (0..1000).filter(|_| run_round(&mut rng)).count();
    eprintln!("successes: {}", successes);
    assert_eq!(successes, 1000);
}

#[test]
fn least_squares_averages_noise() {
    let mut rng = Pcg64::seed_from_u64(1);
    let (transform, sources) = some_test_data(&mut rng, 400);
    let matches = sources.iter().map(|&a| {
        let noise = Vector2::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5));
        FeatureMatch(a, transform.transform_point(&a) + noise)
    });
    let estimate = SimilarityEstimator::new()
        .from_matches(matches.collect::<Vec<_>>().into_iter())
        .expect("didn't get a similarity");
    assert_relative_eq!(estimate.scale(), transform.scale(), epsilon = 1e-3);
    assert!((estimate.angle() - transform.angle()).sin().abs() < 1e-3);
}

fn run_round(rng: &mut Pcg64) -> bool {
    let mut success = true;
    let (transform, sources) = some_test_data(rng, SAMPLE_POINTS);
    let matches = sources
        .iter()
        .map(|&a| FeatureMatch(a, transform.transform_point(&a)));
    let estimate = SimilarityEstimator::new()
        .from_matches(matches.clone())
        .expect("didn't get a similarity");
    for m in matches {
        let residual = estimate.residual(&m);
        if residual > RESIDUAL_THRESHOLD {
            success = false;
            eprintln!("failed residual check: {}", residual);
        }
    }
    success
}

/// Gets a random similarity and random source points inside a box.
fn some_test_data(rng: &mut Pcg64, count: usize) -> (Similarity, Vec<Point2<f64>>) {
    let transform = Similarity::new(
        rng.gen_range(0.5..2.0),
        rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
        Vector2::new(rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0)),
    )
    .expect("scale is positive");
    let sources = (0..count)
        .map(|_| {
            Point2::new(
                rng.gen_range(0.0..POINT_BOX_SIZE),
                rng.gen_range(0.0..POINT_BOX_SIZE),
            )
        })
        .collect();
    (transform, sources)
}
