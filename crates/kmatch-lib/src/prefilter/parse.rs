//! Sequence input parsing
//!
//! Reads FASTA/FASTQ files (transparently gzipped) into an in-memory
//! sequence store, mapping residue letters through the active alphabet.
//! Letters outside the alphabet become the unknown code; validation is
//! deliberately permissive because the extractor skips unknown residues
//! anyway.

use anyhow::{Context, Result};
use needletail::parse_fastx_file;
use std::path::Path;

use crate::alphabet::Alphabet;
use crate::sequence_store::InMemorySequenceStore;

/// Parse a sequence file and call a function for each record.
///
/// The callback receives `(id, residue letters)`.
pub fn parse_sequences<P, F>(path: P, mut callback: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnMut(&[u8], &[u8]) -> Result<()>,
{
    let path = path.as_ref();

    let mut reader = parse_fastx_file(path)
        .with_context(|| format!("Failed to open sequence file: {}", path.display()))?;

    while let Some(record) = reader.next() {
        let record = record
            .with_context(|| format!("Failed to parse sequence record in {}", path.display()))?;
        let seq = record.seq();
        callback(record.id(), &seq)?;
    }

    Ok(())
}

/// Read a whole file into a coded sequence store.
pub fn read_sequence_store<P: AsRef<Path>>(
    path: P,
    alphabet: &Alphabet,
) -> Result<InMemorySequenceStore> {
    let mut store = InMemorySequenceStore::new();
    parse_sequences(path, |id, seq| {
        let key = String::from_utf8_lossy(id).into_owned();
        store.push(key, &alphabet.encode_sequence(seq));
        Ok(())
    })?;
    Ok(store)
}
