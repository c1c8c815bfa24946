use log::*;
use std::path::PathBuf;
use stereo_align::{export, AlignSettings, DescriptorSettings, Error, StereoAligner};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "stereo-align",
    about = "Aligns the right image of a stereo pair onto the left one with a similarity transform.",
    rename_all = "kebab-case"
)]
struct Opt {
    /// A JSON settings file. Options given on the command line take precedence.
    #[structopt(short, long, parse(from_os_str))]
    settings: Option<PathBuf>,
    /// The detector response threshold.
    #[structopt(short, long)]
    threshold: Option<f32>,
    /// Keep only this many of the strongest points of each image.
    #[structopt(long)]
    max_features: Option<usize>,
    /// Detect in tiles no larger than this many pixels on a side.
    #[structopt(long)]
    tile: Option<usize>,
    /// Side length in samples of patch descriptors. Selects the patch descriptor.
    #[structopt(long)]
    patch_size: Option<usize>,
    /// Re-projection distance in pixels below which a match is an inlier.
    #[structopt(long)]
    inlier_threshold: Option<f64>,
    /// Maximum number of RANSAC iterations.
    #[structopt(long)]
    iterations: Option<usize>,
    /// Reject matches whose nearest distance is not below this ratio of the second nearest.
    #[structopt(long)]
    ratio: Option<f32>,
    /// The reference image.
    #[structopt(parse(from_os_str))]
    left: PathBuf,
    /// The image to align onto the reference.
    #[structopt(parse(from_os_str))]
    right: PathBuf,
    /// Outputs are written to `<prefix>-align.txt`, `<prefix>-L.tif` and `<prefix>-R.tif`.
    #[structopt(parse(from_os_str))]
    prefix: PathBuf,
}

impl Opt {
    fn settings(&self) -> Result<AlignSettings, Error> {
        let mut settings = match &self.settings {
            Some(path) => AlignSettings::from_json_file(path)?,
            None => AlignSettings::default(),
        };
        if let Some(threshold) = self.threshold {
            settings.detector.set_threshold(threshold);
        }
        if let Some(max_features) = self.max_features {
            settings.max_features = Some(max_features);
        }
        if let Some(tile) = self.tile {
            settings.max_tile_dimension = tile;
        }
        if let Some(patch_size) = self.patch_size {
            settings.descriptor = match settings.descriptor {
                DescriptorSettings::Patch(patch) => {
                    DescriptorSettings::Patch(keypoints::PatchDescriptor { patch_size, ..patch })
                }
                DescriptorSettings::GradientHistogram(_) => {
                    DescriptorSettings::Patch(keypoints::PatchDescriptor::new(patch_size))
                }
            };
        }
        if let Some(inlier_threshold) = self.inlier_threshold {
            settings.consensus.inlier_threshold = inlier_threshold;
        }
        if let Some(iterations) = self.iterations {
            settings.consensus.max_iterations = iterations;
        }
        if let Some(ratio) = self.ratio {
            settings.matching.ratio = Some(ratio);
        }
        Ok(settings)
    }
}

fn run(opt: Opt) -> Result<(), Error> {
    let settings = opt.settings()?;
    debug!("Settings: {:?}", settings);
    let alignment = StereoAligner::new(settings.clone()).align_files(&opt.left, &opt.right)?;
    export(&opt.prefix, &alignment, &settings.rescale)?;
    Ok(())
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}
