//! File-based storage backend

use crate::{
    error::{Result, StorageError},
    ids::GenerationId,
    memory::MemoryStore,
    traits::{HypergraphSnapshot, HypergraphStore, MorphologyOp},
    vcsr::VCSRSnapshot,
};

use std::io::Write;
use std::path::Path;

/// File-backed storage, memory-cached: every write lands on disk as a VCSR
/// file immediately, and every read checks the in-memory cache before
/// falling back to disk (spec.md §8 "Round-trip and idempotence").
pub struct FileStore {
    /// In-memory cache
    cache: MemoryStore,
    /// Base directory for storage
    base_dir: std::path::PathBuf,
}

impl FileStore {
    /// Create a new file-based store, loading any generations already on
    /// disk under `base_dir` into the cache
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;

        let mut cache = MemoryStore::new();
        for entry in std::fs::read_dir(&base_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("vcsr") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            let snapshot = VCSRSnapshot::from_bytes(&bytes)?;
            cache.add_snapshot(GenerationId::new(snapshot.header.generation), snapshot);
        }

        Ok(Self { cache, base_dir })
    }

    /// Get the path for a generation file
    fn generation_path(&self, generation: GenerationId) -> std::path::PathBuf {
        self.base_dir.join(format!("gen_{:016x}.vcsr", generation.raw()))
    }

    fn write_snapshot(&self, generation: GenerationId, snapshot: &VCSRSnapshot) -> Result<()> {
        let path = self.generation_path(generation);
        let mut file = std::fs::File::create(&path)?;
        file.write_all(&snapshot.to_bytes())?;
        Ok(())
    }
}

impl HypergraphStore for FileStore {
    type Snapshot = <MemoryStore as HypergraphStore>::Snapshot;
    type Error = StorageError;

    fn get_snapshot(&self, generation: GenerationId) -> Result<Self::Snapshot> {
        if let Ok(snapshot) = self.cache.get_snapshot(generation) {
            return Ok(snapshot);
        }

        let path = self.generation_path(generation);
        let bytes = std::fs::read(&path).map_err(|_| StorageError::GenerationNotFound {
            generation: generation.raw(),
        })?;
        let snapshot = VCSRSnapshot::from_bytes(&bytes)?;
        Ok(crate::memory::MemorySnapshot::from(snapshot))
    }

    fn latest_generation(&self) -> Result<GenerationId> {
        self.cache.latest_generation()
    }

    fn list_generations(
        &self,
        start: Option<GenerationId>,
        end: Option<GenerationId>
    ) -> Result<Vec<GenerationId>> {
        self.cache.list_generations(start, end)
    }

    fn create_generation(
        &mut self,
        base: GenerationId,
        operations: &[MorphologyOp]
    ) -> Result<GenerationId> {
        let new_gen = self.cache.create_generation(base, operations)?;
        let snapshot = self.cache.get_snapshot(new_gen)?;
        self.write_snapshot(new_gen, snapshot.as_vcsr())?;
        Ok(new_gen)
    }

    fn compact(&mut self, keep_generations: &[GenerationId]) -> Result<()> {
        self.cache.compact(keep_generations)?;
        let keep: std::collections::HashSet<_> = keep_generations.iter().collect();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("vcsr") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            let generation = GenerationId::new(VCSRSnapshot::from_bytes(&bytes)?.header.generation);
            if !keep.contains(&generation) {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcsr::VCSRVertex;
    use crate::NeuronId;

    #[test]
    fn test_file_store_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();
        assert!(temp_dir.path().exists());
    }

    #[test]
    fn generation_survives_a_fresh_store_over_the_same_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let gen = {
            let mut store = FileStore::new(temp_dir.path()).unwrap();
            let mut snapshot = VCSRSnapshot::new(GenerationId::new(1), 2);
            snapshot.add_vertex(VCSRVertex::new(NeuronId::new(0), 1));
            snapshot.add_vertex(VCSRVertex::new(NeuronId::new(1), 1));
            snapshot.add_edge(NeuronId::new(0), NeuronId::new(1), 0.75);
            snapshot.finalize();
            store.cache.add_snapshot(GenerationId::new(1), snapshot.clone());
            store.write_snapshot(GenerationId::new(1), &snapshot).unwrap();
            GenerationId::new(1)
        };

        let reopened = FileStore::new(temp_dir.path()).unwrap();
        let snapshot = reopened.get_snapshot(gen).unwrap();
        assert_eq!(snapshot.stats().num_neurons, 2);
        let neighbors: Vec<_> = snapshot.neighbors(NeuronId::new(0)).unwrap().collect();
        assert_eq!(neighbors, vec![(NeuronId::new(1), 0.75)]);
    }
}