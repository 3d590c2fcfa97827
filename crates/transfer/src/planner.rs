//! Partitions a manifest into balanced transfer chunks.
//!
//! Chunk 0 always holds every ordinary (inline) file so the destination
//! repository shell and its metadata land before any large object. Large
//! objects are packed into the remaining chunks in size-descending order.
//! Each placement tries the open chunks starting after the one that received
//! the previous file and wraps around; when nothing has room a new chunk is
//! opened. A file is never split, so one larger than the target gets a chunk
//! of its own.
//!
//! If packing produces more than `max_chunks` large chunks, the target is
//! raised to `total_large / max_chunks` and packing runs once more. Any chunk
//! still over budget after that is folded into the least loaded chunk, so
//! the bound holds for every input.

use hubferry_protocol::{Chunk, FileEntry, Manifest};
use tracing::debug;

/// Plans chunks for a manifest.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlanner {
    target_chunk_bytes: u64,
    max_chunks: usize,
}

impl ChunkPlanner {
    /// A zero target is treated as 1 byte and a zero budget as one chunk.
    pub fn new(target_chunk_bytes: u64, max_chunks: usize) -> Self {
        Self {
            target_chunk_bytes: target_chunk_bytes.max(1),
            max_chunks: max_chunks.max(1),
        }
    }

    pub fn target_chunk_bytes(&self) -> u64 {
        self.target_chunk_bytes
    }

    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Returns chunk 0 (ordinary files, always present) followed by at most
    /// `max_chunks` large-object chunks.
    pub fn plan(&self, manifest: &Manifest) -> Vec<Chunk> {
        let mut ordinary = Chunk::new(0);
        let mut large: Vec<FileEntry> = Vec::new();
        for entry in &manifest.files {
            if entry.is_large_object {
                large.push(entry.clone());
            } else {
                ordinary.push(entry.clone());
            }
        }

        if large.is_empty() {
            return vec![ordinary];
        }

        let weighted = self.weigh(large);
        let total_weight: u64 = weighted.iter().map(|(_, w)| *w).sum();

        let mut bins = pack(&weighted, self.target_chunk_bytes);
        if bins.len() > self.max_chunks {
            let escalated = total_weight.div_ceil(self.max_chunks as u64).max(1);
            debug!(
                chunks = bins.len(),
                max_chunks = self.max_chunks,
                target = self.target_chunk_bytes,
                escalated,
                "chunk budget exceeded, repacking with a larger target"
            );
            bins = pack(&weighted, escalated);
            fold_overflow(&mut bins, self.max_chunks);
        }

        let mut chunks = Vec::with_capacity(bins.len() + 1);
        chunks.push(ordinary);
        for (i, bin) in bins.into_iter().enumerate() {
            let mut chunk = Chunk::new(i + 1);
            for entry in bin.files {
                chunk.push(entry);
            }
            chunks.push(chunk);
        }
        chunks
    }

    /// Sorts large entries by size descending and assigns packing weights.
    ///
    /// Entries with an unknown size sort last and weigh the average known
    /// size. With no known sizes at all each weighs the full target, giving
    /// it a chunk of its own.
    fn weigh(&self, mut large: Vec<FileEntry>) -> Vec<(FileEntry, u64)> {
        large.sort_by(|a, b| {
            has_known_size(b)
                .cmp(&has_known_size(a))
                .then(b.size_bytes.cmp(&a.size_bytes))
        });

        let known: Vec<u64> = large
            .iter()
            .filter(|e| has_known_size(e))
            .map(|e| e.size_bytes)
            .collect();
        let unknown_weight = if known.is_empty() {
            self.target_chunk_bytes
        } else {
            (known.iter().sum::<u64>() / known.len() as u64).max(1)
        };

        large
            .into_iter()
            .map(|e| {
                let w = if has_known_size(&e) {
                    e.size_bytes
                } else {
                    unknown_weight
                };
                (e, w)
            })
            .collect()
    }
}

/// Convenience wrapper over [`ChunkPlanner`].
pub fn plan(manifest: &Manifest, target_chunk_bytes: u64, max_chunks: usize) -> Vec<Chunk> {
    ChunkPlanner::new(target_chunk_bytes, max_chunks).plan(manifest)
}

/// Unresolved large objects carry neither a size nor a hash.
fn has_known_size(entry: &FileEntry) -> bool {
    entry.size_bytes > 0 || entry.content_hash.is_some()
}

#[derive(Debug, Default)]
struct Bin {
    files: Vec<FileEntry>,
    load: u64,
}

fn pack(entries: &[(FileEntry, u64)], target: u64) -> Vec<Bin> {
    let mut bins: Vec<Bin> = Vec::new();
    let mut cursor = 0usize;

    for (entry, weight) in entries {
        let n = bins.len();
        let slot = (0..n)
            .map(|k| (cursor + k) % n)
            .find(|&i| bins[i].load.saturating_add(*weight) <= target);
        let i = match slot {
            Some(i) => i,
            None => {
                bins.push(Bin::default());
                bins.len() - 1
            }
        };
        bins[i].files.push(entry.clone());
        bins[i].load = bins[i].load.saturating_add(*weight);
        cursor = (i + 1) % bins.len();
    }

    bins
}

/// Merges the lightest chunks into the least loaded remaining one until at
/// most `max` remain. Ties go to the later chunk.
fn fold_overflow(bins: &mut Vec<Bin>, max: usize) {
    while bins.len() > max {
        let lightest = lightest_index(bins);
        let removed = bins.remove(lightest);
        let into = lightest_index(bins);
        bins[into].load = bins[into].load.saturating_add(removed.load);
        bins[into].files.extend(removed.files);
    }
}

fn lightest_index(bins: &[Bin]) -> usize {
    let mut best = 0;
    for (i, bin) in bins.iter().enumerate() {
        if bin.load <= bins[best].load {
            best = i;
        }
    }
    best
}
