use crate::config::PipelineDef;
use crate::error::{CarveError, Result};
use crate::harvest::{FileHarvester, PipelineRegistry};
use crate::pipeline::Pipeline;
use crate::stage::StageChain;
use crossbeam_channel::unbounded;
use std::fs;
use std::path::PathBuf;
use std::thread;
use tracing::info;

/// Wires the producer to the per-type consumer pipelines and runs them
/// to completion.
pub struct PipelineController {
    harvester: FileHarvester,
    file_types: Vec<String>,
    pipelines: Vec<PipelineDef>,
    contents_dir: PathBuf,
}

impl PipelineController {
    pub fn new(
        harvester: FileHarvester,
        file_types: Vec<String>,
        pipelines: Vec<PipelineDef>,
        contents_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        if file_types.len() != pipelines.len() {
            return Err(CarveError::Config(format!(
                "{} file types but {} pipelines",
                file_types.len(),
                pipelines.len()
            )));
        }
        Ok(Self {
            harvester,
            file_types,
            pipelines,
            contents_dir: contents_dir.into(),
        })
    }

    /// Materialize every stage chain, start producer and consumers, join
    /// them (producer first), and return the dispatched paths. Any
    /// configuration error surfaces before a single thread is spawned.
    pub fn run(mut self) -> Result<Vec<PathBuf>> {
        let mut consumers = Vec::with_capacity(self.pipelines.len());
        let mut entries = Vec::with_capacity(self.pipelines.len());
        for (tag, def) in self.file_types.iter().zip(&self.pipelines) {
            let chain = StageChain::from_descriptors(&def.stages)
                .map_err(|e| CarveError::Config(format!("{tag} pipeline: {e}")))?;
            let (queue, jobs) = unbounded();
            entries.push((tag.clone(), queue));
            consumers.push(Pipeline::new(tag.clone(), chain, &self.contents_dir, jobs));
        }
        let registry = PipelineRegistry::new(entries);
        fs::create_dir_all(&self.contents_dir)?;

        let harvester = &mut self.harvester;
        thread::scope(|scope| -> Result<()> {
            let workers: Vec<_> = consumers
                .into_iter()
                .map(|pipeline| scope.spawn(move || pipeline.run()))
                .collect();
            // The registry moves into the producer thread, so every queue
            // closes once the harvester is done with it.
            let producer = scope.spawn(move || harvester.run(&registry));

            producer
                .join()
                .map_err(|_| CarveError::Worker("harvester thread panicked".to_string()))??;
            for worker in workers {
                worker
                    .join()
                    .map_err(|_| CarveError::Worker("pipeline thread panicked".to_string()))?;
            }
            Ok(())
        })?;

        info!("pipeline controller exiting");
        Ok(self.harvester.take_harvested())
    }
}
