//! External merge engine
//!
//! When the memory plan requires more than one split, each split's
//! grouped records are serialized to a spill file and merged back into a
//! single globally grouped candidate stream.
//!
//! A spill file is a sequence of variable-length groups of packed 6-byte
//! entries: the first entry of a group is the representative header
//! (diagonal 0), the following entries are the members, and a sentinel
//! entry (`seq_id == u32::MAX`) terminates the group. Files are written
//! once, read once through a lazy group iterator over a memory map, and
//! deleted when the run set is dropped.
//!
//! Merging is pairwise in id order: groups with matching representatives
//! are walked in lock-step on member ids, and when both streams carry the
//! same target the entry with the smaller diagonal magnitude wins.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use memmap2::Mmap;
use tracing::{debug, info};

use crate::constants::{SENTINEL_CODE, SPILL_GROUP_END};
use crate::error::KmatchError;

use super::emit::CandidateHit;
use super::extraction::KmerRecord;

/// Size of one spill entry in bytes (packed, no padding).
pub const SPILL_ENTRY_SIZE: usize = 6;

/// On-disk unit of a spill file.
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpillEntry {
    /// Member sequence id, or the group sentinel
    pub seq_id: u32,
    /// Signed diagonal relative to the group's representative
    pub diagonal: i16,
}

impl SpillEntry {
    /// Serialize to the on-disk byte layout.
    pub fn to_bytes(&self) -> [u8; SPILL_ENTRY_SIZE] {
        let mut buf = [0u8; SPILL_ENTRY_SIZE];
        unsafe {
            std::ptr::copy_nonoverlapping(
                self as *const Self as *const u8,
                buf.as_mut_ptr(),
                SPILL_ENTRY_SIZE,
            );
        }
        buf
    }

    /// Read from bytes.
    ///
    /// # Safety
    /// `bytes` must point at `SPILL_ENTRY_SIZE` readable bytes.
    #[inline]
    pub unsafe fn from_bytes(bytes: *const u8) -> Self {
        // SAFETY: read_unaligned handles the packed layout.
        unsafe { std::ptr::read_unaligned(bytes as *const Self) }
    }
}

/// One group decoded from a spill file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillGroup {
    /// Representative sequence id
    pub rep_id: u32,
    /// Member entries, in member-id order
    pub members: Vec<SpillEntry>,
}

/// Lazy posting-list iterator over the groups of one spill file.
pub struct SpillRunReader {
    mmap: Mmap,
    offset: usize,
}

impl SpillRunReader {
    /// Open a spill file, verifying its size against the entry count the
    /// writer reported. A mismatch is fatal.
    pub fn open(path: &Path, expected_entries: usize) -> Result<Self, KmatchError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let expected = expected_entries * SPILL_ENTRY_SIZE;
        if mmap.len() != expected {
            return Err(KmatchError::SpillSizeMismatch {
                path: path.to_path_buf(),
                expected,
                actual: mmap.len(),
            });
        }
        Ok(Self { mmap, offset: 0 })
    }

    /// Decode the next group, or `None` at end of file.
    pub fn next_group(&mut self) -> Option<SpillGroup> {
        if self.offset >= self.mmap.len() {
            return None;
        }
        let header = self.read_entry();
        let rep_id = header.seq_id;
        let mut members = Vec::new();
        loop {
            let entry = self.read_entry();
            if entry.seq_id == SPILL_GROUP_END {
                break;
            }
            members.push(entry);
        }
        Some(SpillGroup { rep_id, members })
    }

    #[inline]
    fn read_entry(&mut self) -> SpillEntry {
        debug_assert!(self.offset + SPILL_ENTRY_SIZE <= self.mmap.len());
        // SAFETY: the size check in `open` guarantees whole entries and
        // the writer always terminates groups, so the debug bound holds.
        let entry = unsafe { SpillEntry::from_bytes(self.mmap.as_ptr().add(self.offset)) };
        self.offset += SPILL_ENTRY_SIZE;
        entry
    }
}

/// Write one split's emission-ordered records as a spill run.
///
/// Groups with no surviving member are skipped entirely. Returns the
/// number of entries written (headers and group sentinels included).
pub fn write_run(path: &Path, records: &[KmerRecord]) -> Result<usize, KmatchError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);
    let mut entries = 0usize;

    let mut idx = 0;
    while idx < records.len() && records[idx].kmer_code != SENTINEL_CODE {
        let rep_code = records[idx].kmer_code;
        let mut end = idx;
        while end < records.len() && records[end].kmer_code == rep_code {
            end += 1;
        }

        let rep_id = rep_code as u32;
        let mut last_member = None;
        let mut members = Vec::with_capacity(end - idx);
        for record in &records[idx..end] {
            if record.seq_id == rep_id || last_member == Some(record.seq_id) {
                continue;
            }
            last_member = Some(record.seq_id);
            members.push(SpillEntry {
                seq_id: record.seq_id,
                diagonal: record.position,
            });
        }

        if !members.is_empty() {
            writer.write_all(&SpillEntry { seq_id: rep_id, diagonal: 0 }.to_bytes())?;
            for member in &members {
                writer.write_all(&member.to_bytes())?;
            }
            writer.write_all(
                &SpillEntry { seq_id: SPILL_GROUP_END, diagonal: 0 }.to_bytes(),
            )?;
            entries += members.len() + 2;
        }
        idx = end;
    }

    writer.flush()?;
    Ok(entries)
}

/// The spill runs of one prefilter invocation.
///
/// Owns the temp files; dropping the set removes them.
pub struct SpillRuns {
    tmp_dir: PathBuf,
    run_id: u64,
    files: Vec<(PathBuf, usize)>,
}

impl SpillRuns {
    /// Create the temp directory and a unique run id.
    pub fn new(tmp_dir: impl AsRef<Path>) -> Result<Self, KmatchError> {
        let tmp_dir = tmp_dir.as_ref().to_path_buf();
        fs::create_dir_all(&tmp_dir)?;
        let run_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_nanos() as u64;
        Ok(Self {
            tmp_dir,
            run_id,
            files: Vec::new(),
        })
    }

    fn split_path(&self, split: usize) -> PathBuf {
        self.tmp_dir
            .join(format!("kmatch.tmp.run_{}.split_{}.bin", self.run_id, split))
    }

    /// Spill one split's emission-ordered records.
    pub fn write_split(
        &mut self,
        split: usize,
        records: &[KmerRecord],
    ) -> Result<(), KmatchError> {
        let path = self.split_path(split);
        let entries = write_run(&path, records)?;
        debug!("spilled {} entries to {:?}", entries, path);
        self.files.push((path, entries));
        Ok(())
    }

    /// Merge all runs into one globally grouped candidate stream.
    pub fn merge(&self) -> Result<Vec<CandidateHit>, KmatchError> {
        info!("merging {} spill runs", self.files.len());
        let mut merged: Vec<CandidateHit> = Vec::new();
        for (i, (path, entries)) in self.files.iter().enumerate() {
            let reader = SpillRunReader::open(path, *entries)?;
            merged = if i == 0 {
                expand_run(reader)
            } else {
                merge_run(merged, reader)
            };
        }
        info!("merged stream holds {} candidates", merged.len());
        Ok(merged)
    }
}

impl Drop for SpillRuns {
    fn drop(&mut self) {
        for (path, _) in &self.files {
            let _ = fs::remove_file(path);
        }
    }
}

fn expand_run(mut reader: SpillRunReader) -> Vec<CandidateHit> {
    let mut out = Vec::new();
    while let Some(group) = reader.next_group() {
        push_group(&mut out, &group);
    }
    out
}

fn push_group(out: &mut Vec<CandidateHit>, group: &SpillGroup) {
    for member in &group.members {
        out.push(CandidateHit {
            rep_id: group.rep_id,
            member_id: member.seq_id,
            diagonal: member.diagonal,
        });
    }
}

/// Keep the diagonal with the smaller magnitude; the signed value breaks
/// ties so the choice is deterministic.
#[inline]
fn closer_diagonal(a: i16, b: i16) -> i16 {
    if (a.unsigned_abs(), a) <= (b.unsigned_abs(), b) {
        a
    } else {
        b
    }
}

fn merge_run(current: Vec<CandidateHit>, mut reader: SpillRunReader) -> Vec<CandidateHit> {
    let mut out = Vec::with_capacity(current.len());
    let mut i = 0;
    let mut next_group = reader.next_group();

    while i < current.len() {
        let group = match &next_group {
            Some(g) => g,
            None => break,
        };
        let rep = current[i].rep_id;
        if rep < group.rep_id {
            out.push(current[i]);
            i += 1;
        } else if rep > group.rep_id {
            push_group(&mut out, group);
            next_group = reader.next_group();
        } else {
            // Same representative: lock-step walk on member ids.
            let mut j = 0;
            while i < current.len() && current[i].rep_id == rep && j < group.members.len() {
                let a = current[i];
                let b = group.members[j];
                if a.member_id == b.seq_id {
                    out.push(CandidateHit {
                        rep_id: rep,
                        member_id: a.member_id,
                        diagonal: closer_diagonal(a.diagonal, b.diagonal),
                    });
                    i += 1;
                    j += 1;
                } else if a.member_id < b.seq_id {
                    out.push(a);
                    i += 1;
                } else {
                    out.push(CandidateHit {
                        rep_id: rep,
                        member_id: b.seq_id,
                        diagonal: b.diagonal,
                    });
                    j += 1;
                }
            }
            while i < current.len() && current[i].rep_id == rep {
                out.push(current[i]);
                i += 1;
            }
            while j < group.members.len() {
                let b = group.members[j];
                out.push(CandidateHit {
                    rep_id: rep,
                    member_id: b.seq_id,
                    diagonal: b.diagonal,
                });
                j += 1;
            }
            next_group = reader.next_group();
        }
    }

    out.extend_from_slice(&current[i..]);
    while let Some(group) = next_group {
        push_group(&mut out, &group);
        next_group = reader.next_group();
    }
    out
}
