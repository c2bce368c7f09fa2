use carvegen_core::config::{Config, Definitions, HarvesterKind, SamplerKind};
use carvegen_core::controller::PipelineController;
use carvegen_core::error::Result;
use carvegen_core::harvest::FileHarvester;
use carvegen_core::sampler::DiskImageSampler;
use carvegen_core::session;
use std::path::PathBuf;
use tracing::info;

pub fn handle_generate(config_path: PathBuf, force: bool) -> Result<()> {
    let config = Config::load(&config_path)?;
    let Definitions {
        harvester: file_types,
        pipelines,
        sampler,
    } = Definitions::load(&config.paths.json_file)?;

    // The session cache keys the contents directory off the inputs; an
    // unchanged corpus and definitions document skip reprocessing.
    let session = session::resolve(&config.paths.source, &config.paths.json_file)?;
    if session.already_ran && !force {
        info!("contents already present; skipping the processing phase");
    } else {
        let harvester = match config.components.harvester_kind()? {
            HarvesterKind::FileHarvester => FileHarvester::new(&config.paths.source),
        };
        let controller = PipelineController::new(
            harvester,
            file_types,
            pipelines,
            &session.contents_dir,
        )?;
        let harvested = controller.run()?;
        info!(files = harvested.len(), "processing phase finished");
    }

    let mut image_sampler = match config.components.sampler_kind()? {
        SamplerKind::DiskImageSampler => DiskImageSampler::new(
            sampler.size_mb()?,
            &session.contents_dir,
            &config.paths.destination,
            sampler.merge_chunks()?,
        )?,
    };
    image_sampler.generate_image()?;
    image_sampler.fill_truth_map()
}
