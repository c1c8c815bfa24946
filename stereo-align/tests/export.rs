use align_core::nalgebra::Vector2;
use approx::assert_relative_eq;
use stereo_align::export::{read_matrix, read_transform, OutputPaths};
use stereo_align::warp::Rescale;
use stereo_align::{export, Alignment, Error, GrayFloatImage, Similarity};

fn alignment() -> Alignment {
    Alignment {
        transform: Similarity::new(0.98, 0.05, Vector2::new(-2.25, 7.5)).unwrap(),
        matches: vec![],
        inliers: vec![],
        iterations: 0,
        reference: GrayFloatImage::from_fn(40, 30, |x, y| (x + y) as f32 / 68.0),
        warped: GrayFloatImage::from_fn(40, 30, |x, _| if x < 20 { 0.0 } else { 0.75 }),
    }
}

#[test]
fn writes_matrix_and_images_next_to_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("scene");
    let alignment = alignment();

    let paths = export(&prefix, &alignment, &Rescale::default()).unwrap();
    assert_eq!(paths, OutputPaths::new(&prefix));
    assert_eq!(paths.matrix, dir.path().join("scene-align.txt"));
    assert_eq!(paths.reference, dir.path().join("scene-L.tif"));
    assert_eq!(paths.warped, dir.path().join("scene-R.tif"));

    assert_eq!(
        read_matrix(&paths.matrix).unwrap(),
        alignment.transform.to_matrix()
    );
    let transform = read_transform(&paths.matrix).unwrap();
    assert_relative_eq!(transform.scale(), 0.98, epsilon = 1e-12);
    assert_relative_eq!(transform.angle(), 0.05, epsilon = 1e-12);

    let reference = image::open(&paths.reference).unwrap().to_luma8();
    assert_eq!(reference.dimensions(), (40, 30));
    assert_eq!(reference.get_pixel(0, 0).0, [0]);
    assert_eq!(reference.get_pixel(39, 29).0, [255]);
    let warped = image::open(&paths.warped).unwrap().to_luma8();
    assert_eq!(warped.get_pixel(5, 5).0, [0]);
    assert_eq!(warped.get_pixel(25, 5).0, [191]);
}

#[test]
fn min_max_rescale_is_shared_by_both_images() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("pair");
    let paths = export(&prefix, &alignment(), &Rescale::MinMax).unwrap();
    // The warped image never exceeds 0.75 while the reference reaches 1.
    let warped = image::open(&paths.warped).unwrap().to_luma8();
    assert_eq!(warped.get_pixel(25, 5).0, [191]);
}

#[test]
fn malformed_matrix_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad-align.txt");
    std::fs::write(&path, "3 3\n1 0 0\n0 1\n").unwrap();
    assert!(matches!(read_matrix(&path), Err(Error::MatrixFormat(_))));

    // Shear is not a similarity.
    std::fs::write(&path, "3 3\n1 0.5 0\n0 1 0\n0 0 1\n").unwrap();
    assert!(matches!(read_transform(&path), Err(Error::MatrixFormat(_))));

    assert!(matches!(
        read_matrix(dir.path().join("missing.txt")),
        Err(Error::Io(_))
    ));
}
