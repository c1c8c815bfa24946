use keypoints::{
    cull, DescriptorExtractor, Detector, GradientHistogramDescriptor, GrayFloatImage, Harris,
    Hessian, PatchDescriptor, Tiled,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// Overlapping rectangles of random intensity on a grey background.
fn scene(width: usize, height: usize, seed: u64) -> GrayFloatImage {
    let mut rng = Pcg64::seed_from_u64(seed);
    let rectangles = (0..40)
        .map(|_| {
            let x = rng.gen_range(0..width);
            let y = rng.gen_range(0..height);
            let w = rng.gen_range(8..width / 4);
            let h = rng.gen_range(8..height / 4);
            (x, y, w, h, rng.gen_range(0.0f32..1.0))
        })
        .collect::<Vec<_>>();
    GrayFloatImage::from_fn(width, height, |px, py| {
        rectangles
            .iter()
            .rev()
            .find(|&&(x, y, w, h, _)| (x..x + w).contains(&px) && (y..y + h).contains(&py))
            .map_or(0.5, |&(_, _, _, _, value)| value)
    })
}

#[test]
fn detection_is_deterministic() {
    let _ = pretty_env_logger::try_init_timed();
    let image = scene(200, 160, 1);
    for detector in [
        Box::new(Harris::default()) as Box<dyn Detector>,
        Box::new(Hessian::default()),
    ] {
        let first = detector.detect(&image);
        let second = detector.detect(&image);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}

#[test]
fn tiled_matches_untiled_for_one_octave() {
    let _ = pretty_env_logger::try_init_timed();
    let image = scene(300, 220, 2);
    let harris = Harris {
        octaves: 1,
        ..Default::default()
    };
    let whole = harris.detect(&image);
    let tiled = Tiled::new(harris, 64).detect(&image);
    assert!(!whole.is_empty());
    assert_eq!(whole.len(), tiled.len());
    for (a, b) in whole.iter().zip(&tiled) {
        // Offsetting by the tile origin may round the last bit differently.
        assert_eq!(a.response, b.response);
        assert_eq!(a.octave, b.octave);
        assert!(
            (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3,
            "{:?} != {:?}",
            a,
            b
        );
    }
}

#[test]
fn tiled_points_are_unique() {
    let _ = pretty_env_logger::try_init_timed();
    let image = scene(256, 256, 3);
    let points = Tiled::new(Harris::default(), 100).detect(&image);
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            assert!(a.x != b.x || a.y != b.y || a.octave != b.octave);
        }
    }
}

#[test]
fn culled_features_have_descriptors() {
    let _ = pretty_env_logger::try_init_timed();
    let image = scene(256, 200, 4);
    let points = cull(Tiled::new(Harris::default(), 2048).detect(&image), Some(50));
    assert!(points.len() <= 50);
    assert!(points.windows(2).all(|w| w[0].response >= w[1].response));

    for extractor in [
        Box::new(PatchDescriptor::default()) as Box<dyn DescriptorExtractor>,
        Box::new(GradientHistogramDescriptor::default()),
    ] {
        let features = extractor.extract(&image, &points);
        assert!(!features.is_empty());
        assert!(features.len() <= points.len());
        assert!(features
            .iter()
            .all(|f| f.descriptor.len() == extractor.len()));
        // Features keep the order of the points they came from.
        let positions = features
            .iter()
            .map(|f| points.iter().position(|p| *p == f.point).unwrap())
            .collect::<Vec<_>>();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
