use clap::Parser;
use log::{error, info};
use std::process::ExitCode;

use labelconv::io::{read_dataset, write_dataset};
use labelconv::{
    apply_rules, filter_annotations, process_images, split_dataset_seeded, transform_bboxes, Args,
};

fn run(mut args: Args) -> Result<(), Box<dyn std::error::Error>> {
    args.validate()?;
    let rules = args.label_rules()?;
    let boundaries = args.split_boundaries()?;
    let image_options = args.image_options()?;

    let mut data = read_dataset(&args.labels, args.images.as_deref())?;

    apply_rules(&mut data, &rules);
    transform_bboxes(&mut data, &args.bbox_transform());
    filter_annotations(&mut data, &args.filter_config());

    if let Err(e) = process_images(&mut data, &image_options) {
        return Err(format!("Image processing failed: {}", e).into());
    }

    let total = data.len();
    let datasets = if boundaries.len() == 1 {
        vec![data]
    } else {
        split_dataset_seeded(data, &boundaries, args.seed)?
    };

    for (dataset, out_path) in datasets.iter().zip(&args.labels_out) {
        write_dataset(out_path, dataset)?;
        info!(
            "Successfully wrote labels for {} files to {}",
            dataset.len(),
            out_path.display()
        );
    }

    info!("Total number of labelled files: {}", total);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
