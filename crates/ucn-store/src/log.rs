use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use ucn_types::ChainName;

use crate::config::SyncMode;
use crate::error::{BackendError, BackendResult};
use crate::partition::LogOp;

/// File extension of chain logs.
pub const LOG_EXTENSION: &str = "chain";

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// A frame recovered from disk: its byte offset and the ops it carries.
pub(crate) type Frame = (u64, Vec<LogOp>);

/// Append-only log of committed transactions for one chain.
///
/// Every committed transaction is written as one frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized Vec<LogOp>)]
/// ```
/// A transaction is durable once its whole frame is on disk. A frame cut
/// short by a crash fails its length or CRC check and is discarded on
/// recovery, which is what makes each commit all-or-nothing.
pub(crate) struct ChainLog {
    path: PathBuf,
    /// Opened lazily on the first append.
    writer: Option<BufWriter<File>>,
    /// Length of the valid prefix of the file.
    offset: u64,
    sync: SyncMode,
}

impl ChainLog {
    /// Path of the log for `chain` under `root`.
    pub(crate) fn path_for(root: &Path, chain: &ChainName) -> PathBuf {
        root.join(format!("{chain}.{LOG_EXTENSION}"))
    }

    /// A log whose file does not exist yet.
    pub(crate) fn empty(path: PathBuf, sync: SyncMode) -> Self {
        Self {
            path,
            writer: None,
            offset: 0,
            sync,
        }
    }

    /// Open an existing log and read back every intact frame.
    ///
    /// Only the final frame can be torn by a crash. A damaged frame is
    /// accepted as torn when no intact frame follows it; the tail is then
    /// copied to `<chain>.chain.corrupt` and cut from the log. A damaged
    /// frame with an intact frame anywhere after it fails with
    /// [`BackendError::CorruptLog`] and leaves the file untouched.
    pub(crate) fn recover(path: &Path, sync: SyncMode) -> BackendResult<(Self, Vec<Frame>)> {
        let bytes = fs::read(path)?;
        let file_len = bytes.len() as u64;
        let mut frames = Vec::new();
        let mut offset: usize = 0;

        while offset < bytes.len() {
            let remaining = bytes.len() - offset;
            if remaining < HEADER_SIZE {
                warn!(path = ?path, offset, "truncated frame header; dropping tail");
                break;
            }

            let (length, expected_crc) = read_header(&bytes[offset..]);
            let end = offset + HEADER_SIZE + length;

            if end > bytes.len() {
                if let Some(next) = next_frame(&bytes, offset + 1) {
                    return Err(corrupt(
                        path,
                        offset as u64,
                        format!("frame length {length} overruns the log, intact frame at {next}"),
                    ));
                }
                warn!(
                    path = ?path,
                    offset,
                    length,
                    file_len,
                    "truncated frame payload; dropping tail"
                );
                break;
            }

            let payload = &bytes[offset + HEADER_SIZE..end];
            let actual_crc = crc32fast::hash(payload);
            if actual_crc != expected_crc {
                if end == bytes.len() {
                    warn!(
                        path = ?path,
                        offset,
                        expected = expected_crc,
                        actual = actual_crc,
                        "CRC mismatch on final frame; dropping tail"
                    );
                    break;
                }
                return Err(corrupt(
                    path,
                    offset as u64,
                    format!("CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"),
                ));
            }

            let ops: Vec<LogOp> = bincode::deserialize(payload)
                .map_err(|e| corrupt(path, offset as u64, format!("undecodable frame: {e}")))?;
            frames.push((offset as u64, ops));
            offset = end;
        }

        let valid_len = offset as u64;
        if valid_len < file_len {
            let saved = preserve_tail(path, &bytes[offset..])?;
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
            warn!(
                path = ?path,
                valid_len,
                file_len,
                saved = ?saved,
                "truncated chain log to last good frame"
            );
        }

        debug!(path = ?path, frames = frames.len(), "chain log recovered");
        Ok((
            Self {
                path: path.to_path_buf(),
                writer: None,
                offset: valid_len,
                sync,
            },
            frames,
        ))
    }

    /// Append one frame holding `ops`. Returns the frame's byte offset.
    ///
    /// If the write fails part-way, the file is cut back to where the frame
    /// started so later frames never follow garbage.
    pub(crate) fn append(&mut self, ops: &[LogOp]) -> BackendResult<u64> {
        let payload =
            bincode::serialize(ops).map_err(|e| BackendError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| BackendError::Serialization("frame exceeds 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);
        let start = self.offset;

        if let Err(err) = self.write_frame(length, crc, &payload) {
            self.writer = None;
            if let Err(trim_err) = self.truncate_to(start) {
                warn!(
                    path = ?self.path,
                    offset = start,
                    error = %trim_err,
                    "failed to trim partial frame"
                );
            }
            return Err(err);
        }

        self.offset += (HEADER_SIZE + payload.len()) as u64;
        debug!(
            path = ?self.path,
            offset = start,
            len = payload.len(),
            ops = ops.len(),
            "chain log append"
        );
        Ok(start)
    }

    /// Replace the whole log with a single frame holding `ops`.
    ///
    /// The new log is written beside the old one and renamed over it, so a
    /// crash leaves either the old or the new file intact.
    pub(crate) fn rewrite(&mut self, ops: &[LogOp]) -> BackendResult<()> {
        let tmp_path = self.path.with_extension(format!("{LOG_EXTENSION}.tmp"));
        let mut compacted = Self::empty(tmp_path.clone(), SyncMode::EveryWrite);
        // Start from an empty file even if a stale temp file is around.
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }
        if ops.is_empty() {
            File::create(&tmp_path)?.sync_all()?;
        } else {
            compacted.append(ops)?;
        }
        let new_len = compacted.offset;
        drop(compacted);

        self.writer = None;
        fs::rename(&tmp_path, &self.path)?;
        self.offset = new_len;
        debug!(path = ?self.path, len = new_len, "chain log rewritten");
        Ok(())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of valid frames on disk.
    pub(crate) fn len(&self) -> u64 {
        self.offset
    }

    fn write_frame(&mut self, length: u32, crc: u32, payload: &[u8]) -> BackendResult<()> {
        let sync = self.sync;
        let writer = self.writer()?;
        writer.write_all(&length.to_le_bytes())?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.write_all(payload)?;
        writer.flush()?;
        if matches!(sync, SyncMode::EveryWrite) {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn writer(&mut self) -> BackendResult<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| BackendError::Serialization("chain log writer unavailable".into()))
    }

    fn truncate_to(&self, len: u64) -> BackendResult<()> {
        if self.path.exists() {
            OpenOptions::new().write(true).open(&self.path)?.set_len(len)?;
        }
        Ok(())
    }
}

/// Payload length and CRC from the first [`HEADER_SIZE`] bytes of `bytes`.
fn read_header(bytes: &[u8]) -> (usize, u32) {
    let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    (length as usize, crc)
}

/// Offset of the first intact, decodable frame starting at or after `from`.
///
/// Payload bytes that happen to embed a valid frame make a torn tail look
/// like corruption; recovery then refuses to open rather than cut data.
fn next_frame(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len().saturating_sub(HEADER_SIZE)).find(|&start| {
        let (length, crc) = read_header(&bytes[start..]);
        let end = start + HEADER_SIZE + length;
        if length == 0 || end > bytes.len() {
            return false;
        }
        let payload = &bytes[start + HEADER_SIZE..end];
        crc32fast::hash(payload) == crc && bincode::deserialize::<Vec<LogOp>>(payload).is_ok()
    })
}

/// Append a dropped tail to `<log>.corrupt` so it can be inspected later.
fn preserve_tail(path: &Path, tail: &[u8]) -> BackendResult<PathBuf> {
    let saved = path.with_extension(format!("{LOG_EXTENSION}.corrupt"));
    let mut file = OpenOptions::new().create(true).append(true).open(&saved)?;
    file.write_all(tail)?;
    file.sync_all()?;
    Ok(saved)
}

fn corrupt(path: &Path, offset: u64, reason: String) -> BackendError {
    BackendError::CorruptLog {
        path: path.to_path_buf(),
        offset,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};
    use ucn_crypto::ContentHasher;
    use ucn_types::{BlockRecord, StoredBlock};

    fn insert(index: u64, payload: &str) -> LogOp {
        let record = BlockRecord::new("test", payload.as_bytes().to_vec(), "", index);
        LogOp::Insert(StoredBlock::new(ContentHasher::block_hash(&record), record))
    }

    fn frame_ops(frames: Vec<Frame>) -> Vec<Vec<LogOp>> {
        frames.into_iter().map(|(_, ops)| ops).collect()
    }

    #[test]
    fn append_and_recover_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.chain");
        let mut log = ChainLog::empty(path.clone(), SyncMode::EveryWrite);

        let first = vec![insert(0, "a")];
        let second = vec![LogOp::Truncate { from: 0 }, insert(0, "b")];
        assert_eq!(log.append(&first).unwrap(), 0);
        let second_offset = log.append(&second).unwrap();
        assert!(second_offset > 0);

        let (recovered, frames) = ChainLog::recover(&path, SyncMode::EveryWrite).unwrap();
        assert_eq!(frames[1].0, second_offset);
        assert_eq!(frame_ops(frames), vec![first, second]);
        assert_eq!(recovered.offset, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.chain");
        let mut log = ChainLog::empty(path.clone(), SyncMode::OsDefault);
        log.append(&[insert(0, "a")]).unwrap();
        let good_len = fs::metadata(&path).unwrap().len();
        log.append(&[insert(1, "b")]).unwrap();
        drop(log);

        // Chop the last frame in half.
        let full_len = fs::metadata(&path).unwrap().len();
        let cut = good_len + (full_len - good_len) / 2;
        OpenOptions::new().write(true).open(&path).unwrap().set_len(cut).unwrap();

        let (_, frames) = ChainLog::recover(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

        // The dropped bytes are kept beside the log.
        let saved = dir.path().join("blocks.chain.corrupt");
        assert_eq!(fs::metadata(saved).unwrap().len(), cut - good_len);
    }

    #[test]
    fn corrupt_final_frame_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.chain");
        let mut log = ChainLog::empty(path.clone(), SyncMode::OsDefault);
        log.append(&[insert(0, "a")]).unwrap();
        let good_len = fs::metadata(&path).unwrap().len();
        log.append(&[insert(1, "b")]).unwrap();
        drop(log);

        flip_byte(&path, good_len + HEADER_SIZE as u64);

        let (_, frames) = ChainLog::recover(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn corrupt_inner_frame_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.chain");
        let mut log = ChainLog::empty(path.clone(), SyncMode::OsDefault);
        log.append(&[insert(0, "a")]).unwrap();
        log.append(&[insert(1, "b")]).unwrap();
        drop(log);

        flip_byte(&path, HEADER_SIZE as u64);

        let err = ChainLog::recover(&path, SyncMode::OsDefault).err().unwrap();
        assert!(matches!(err, BackendError::CorruptLog { offset: 0, .. }));
    }

    #[test]
    fn damaged_length_before_intact_frames_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.chain");
        let mut log = ChainLog::empty(path.clone(), SyncMode::OsDefault);
        log.append(&[insert(0, "a")]).unwrap();
        log.append(&[insert(1, "b")]).unwrap();
        log.append(&[insert(2, "c")]).unwrap();
        drop(log);
        let len = fs::metadata(&path).unwrap().len();

        // High byte of the first frame's length: the frame now overruns the file.
        flip_byte(&path, 3);

        let err = ChainLog::recover(&path, SyncMode::OsDefault).err().unwrap();
        assert!(matches!(err, BackendError::CorruptLog { offset: 0, .. }));
        assert_eq!(fs::metadata(&path).unwrap().len(), len);
        assert!(!dir.path().join("blocks.chain.corrupt").exists());
    }

    #[test]
    fn overrunning_final_frame_is_torn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.chain");
        let mut log = ChainLog::empty(path.clone(), SyncMode::OsDefault);
        log.append(&[insert(0, "a")]).unwrap();
        let good_len = fs::metadata(&path).unwrap().len();
        log.append(&[insert(1, "b")]).unwrap();
        drop(log);

        flip_byte(&path, good_len + 3);

        let (_, frames) = ChainLog::recover(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.chain");
        let mut log = ChainLog::empty(path.clone(), SyncMode::EveryWrite);
        log.append(&[insert(0, "a")]).unwrap();
        log.append(&[LogOp::Truncate { from: 0 }]).unwrap();
        log.append(&[insert(0, "b")]).unwrap();

        log.rewrite(&[insert(0, "b")]).unwrap();
        log.append(&[insert(1, "c")]).unwrap();

        let (_, frames) = ChainLog::recover(&path, SyncMode::EveryWrite).unwrap();
        assert_eq!(
            frame_ops(frames),
            vec![vec![insert(0, "b")], vec![insert(1, "c")]]
        );
    }

    fn flip_byte(path: &Path, at: u64) {
        let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
        file.seek(SeekFrom::Start(at)).unwrap();
        let mut buf = [0u8; 1];
        file.read_exact(&mut buf).unwrap();
        buf[0] ^= 0xFF;
        file.seek(SeekFrom::Start(at)).unwrap();
        file.write_all(&buf).unwrap();
        file.sync_all().unwrap();
    }
}
