use crate::stage::StageChain;
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use tracing::{error, info};

/// Message type of the harvester → pipeline queues. End of stream is a
/// dedicated variant, not an in-band marker value.
#[derive(Clone, Debug)]
pub enum Job {
    File(PathBuf),
    Shutdown,
}

/// A per-file-type consumer: one stage chain, one input queue, one tag.
/// Files are processed sequentially, which keeps chunk artifacts on disk
/// in index order.
pub struct Pipeline {
    file_type: String,
    chain: StageChain,
    contents_dir: PathBuf,
    jobs: Receiver<Job>,
}

impl Pipeline {
    pub fn new(
        file_type: impl Into<String>,
        chain: StageChain,
        contents_dir: impl Into<PathBuf>,
        jobs: Receiver<Job>,
    ) -> Self {
        Self {
            file_type: file_type.into(),
            chain,
            contents_dir: contents_dir.into(),
            jobs,
        }
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    /// Consume queued files until shutdown. A failure on one file is
    /// logged and the pipeline moves on to the next. Returns the buffers
    /// produced by the last successfully processed file.
    pub fn run(self) -> Vec<Vec<u8>> {
        info!(file_type = %self.file_type, "pipeline started");
        let mut last_output = Vec::new();
        while let Ok(job) = self.jobs.recv() {
            let path = match job {
                Job::File(path) => path,
                Job::Shutdown => break,
            };
            info!(file_type = %self.file_type, file = %path.display(), "processing");
            match self.chain.run(&path, &self.contents_dir) {
                Ok(buffers) => last_output = buffers,
                Err(err) => {
                    error!(
                        file_type = %self.file_type,
                        file = %path.display(),
                        %err,
                        "failed to process file"
                    );
                }
            }
        }
        info!(file_type = %self.file_type, "pipeline exiting");
        last_output
    }
}
