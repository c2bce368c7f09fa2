use crate::error::{CarveError, Result};
use crate::pipeline::Job;
use crate::sniff;
use crossbeam_channel::Sender;
use glob::Pattern;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Ordered tag → queue mapping. Populated by the controller before any
/// worker starts; read-only afterwards.
pub struct PipelineRegistry {
    entries: Vec<(String, Sender<Job>)>,
}

impl PipelineRegistry {
    pub fn new(entries: Vec<(String, Sender<Job>)>) -> Self {
        Self { entries }
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(tag, _)| tag.as_str())
    }

    /// First registered entry whose tag prefixes `classification`.
    fn dispatch(&self, classification: &str) -> Option<&(String, Sender<Job>)> {
        self.entries
            .iter()
            .find(|(tag, _)| classification.starts_with(tag.as_str()))
    }

    /// Send exactly one end-of-stream marker to every pipeline.
    fn shutdown_all(&self) {
        for (tag, queue) in &self.entries {
            if queue.send(Job::Shutdown).is_err() {
                warn!(%tag, "pipeline queue already closed");
            }
        }
    }
}

/// The producer: walks the source tree, classifies each matching file and
/// feeds it to the pipeline registered for its type.
pub struct FileHarvester {
    root: PathBuf,
    patterns: Vec<Pattern>,
    recursive: bool,
    harvested: Vec<PathBuf>,
}

impl FileHarvester {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: vec![Pattern::new("*").expect("literal pattern")],
            recursive: true,
            harvested: Vec::new(),
        }
    }

    /// Replace the filename glob patterns (default `*`).
    pub fn set_patterns(&mut self, globs: &[String]) -> Result<()> {
        let mut patterns = Vec::with_capacity(globs.len());
        for raw in globs {
            patterns.push(
                Pattern::new(raw)
                    .map_err(|e| CarveError::Config(format!("bad glob `{raw}`: {e}")))?,
            );
        }
        self.patterns = patterns;
        Ok(())
    }

    pub fn set_recursive(&mut self, recursive: bool) {
        self.recursive = recursive;
    }

    /// Absolute paths of every dispatched file, in dispatch order.
    pub fn harvested(&self) -> &[PathBuf] {
        &self.harvested
    }

    pub fn take_harvested(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.harvested)
    }

    /// Enumerate and dispatch. Every registered pipeline receives its
    /// end-of-stream marker even when enumeration fails part-way.
    pub fn run(&mut self, registry: &PipelineRegistry) -> Result<()> {
        info!(root = %self.root.display(), "harvester started");
        let outcome = self.enumerate(registry);
        registry.shutdown_all();
        info!(count = self.harvested.len(), "harvester exiting");
        outcome
    }

    fn enumerate(&mut self, registry: &PipelineRegistry) -> Result<()> {
        if !self.root.is_dir() {
            return Err(CarveError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("source directory not found: {}", self.root.display()),
            )));
        }
        let root = fs::canonicalize(&self.root)?;
        let max_depth = if self.recursive { usize::MAX } else { 1 };

        for entry in WalkDir::new(&root).max_depth(max_depth).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(%err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !self.patterns.iter().any(|p| p.matches(&name)) {
                continue;
            }
            let path = entry.into_path();
            self.dispatch_one(registry, path);
        }
        Ok(())
    }

    fn dispatch_one(&mut self, registry: &PipelineRegistry, path: PathBuf) {
        let classification = match sniff::classify(&path) {
            Ok(classification) => classification,
            Err(err) => {
                warn!(file = %path.display(), %err, "classification failed; skipping");
                return;
            }
        };
        let Some((tag, queue)) = registry.dispatch(&classification) else {
            debug!(file = %path.display(), %classification, "no pipeline for type");
            return;
        };
        info!(file = %path.display(), %tag, "dispatching");
        if queue.send(Job::File(path.clone())).is_err() {
            warn!(%tag, file = %path.display(), "pipeline queue closed; dropping file");
            return;
        }
        self.harvested.push(path);
    }
}
