//! Output hit store writer
//!
//! Each sequence gets exactly one record: an ordered list of candidate
//! hits, the first of which is always the self/header entry. The on-disk
//! encoding is line-oriented — `targetKey\tscore\tdiagonal` per hit — with
//! each record terminated by a NUL byte the downstream aligner recognizes
//! as the end-of-entry marker. A sidecar `.index` file maps external keys
//! to `(offset, length)` within the data file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One candidate hit in an output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit<'a> {
    /// External key of the target sequence.
    pub target_key: &'a str,
    /// Placeholder score; the prefilter does not align.
    pub score: u32,
    /// Signed diagonal offset of the shared k-mer evidence.
    pub diagonal: i16,
}

/// Sink for per-sequence hit records.
pub trait HitWriter {
    /// Write one record. `key` is the owning sequence's external key and
    /// `hits` starts with its self/header entry.
    fn write_entry(&mut self, key: &str, hits: &[Hit<'_>]) -> std::io::Result<()>;

    /// Flush any buffered output.
    fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Hit store writing the flat data + index file pair.
pub struct FlatFileHitStore {
    data: BufWriter<File>,
    index: BufWriter<File>,
    offset: u64,
}

impl FlatFileHitStore {
    /// Create `path` and `path.index`, truncating existing files.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let index_path: PathBuf = {
            let mut p = path.as_os_str().to_owned();
            p.push(".index");
            p.into()
        };
        Ok(Self {
            data: BufWriter::with_capacity(1024 * 1024, File::create(path)?),
            index: BufWriter::new(File::create(index_path)?),
            offset: 0,
        })
    }
}

impl HitWriter for FlatFileHitStore {
    fn write_entry(&mut self, key: &str, hits: &[Hit<'_>]) -> std::io::Result<()> {
        let start = self.offset;
        let mut written = 0u64;
        for hit in hits {
            let line = format!("{}\t{}\t{}\n", hit.target_key, hit.score, hit.diagonal);
            self.data.write_all(line.as_bytes())?;
            written += line.len() as u64;
        }
        self.data.write_all(b"\0")?;
        written += 1;
        self.offset += written;
        writeln!(self.index, "{}\t{}\t{}", key, start, written)?;
        Ok(())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.data.flush()?;
        self.index.flush()
    }
}

/// An owned hit, as captured by [`MemoryHitStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedHit {
    /// External key of the target sequence.
    pub target_key: String,
    /// Placeholder score.
    pub score: u32,
    /// Signed diagonal offset.
    pub diagonal: i16,
}

/// Hit store keeping records in memory; useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryHitStore {
    /// `(owning key, hits)` in emission order.
    pub entries: Vec<(String, Vec<OwnedHit>)>,
}

impl MemoryHitStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HitWriter for MemoryHitStore {
    fn write_entry(&mut self, key: &str, hits: &[Hit<'_>]) -> std::io::Result<()> {
        let owned = hits
            .iter()
            .map(|h| OwnedHit {
                target_key: h.target_key.to_string(),
                score: h.score,
                diagonal: h.diagonal,
            })
            .collect();
        self.entries.push((key.to_string(), owned));
        Ok(())
    }
}
