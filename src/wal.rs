use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::model::Event;

/// Length prefix plus CRC trailer around each payload.
const FRAME_OVERHEAD: u64 = 8;

/// Frame one event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large for WAL frame"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Fill `buf` or report a clean end of log (`false`) on a short read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact event and its frame length, or `None` at end of log,
/// truncation or corruption. A length prefix claiming more than `remaining`
/// bytes is corruption, not an allocation request.
fn decode_next(reader: &mut impl Read, remaining: u64) -> io::Result<Option<(Event, u64)>> {
    if remaining < FRAME_OVERHEAD {
        return Ok(None);
    }
    let mut len_buf = [0u8; 4];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u64::from(u32::from_le_bytes(len_buf));
    if len > remaining - FRAME_OVERHEAD {
        return Ok(None);
    }
    let mut payload = vec![0u8; len as usize];
    if !read_full(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_full(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, len + FRAME_OVERHEAD)))
}

/// Decode frames from a log of `total_len` bytes. Returns the intact events
/// and the length of the prefix they occupy.
pub(crate) fn read_log(reader: &mut impl Read, total_len: u64) -> io::Result<(Vec<Event>, u64)> {
    let mut events = Vec::new();
    let mut intact = 0u64;
    while let Some((event, frame_len)) = decode_next(reader, total_len - intact)? {
        events.push(event);
        intact += frame_len;
    }
    Ok((events, intact))
}

fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let total_len = file.metadata()?.len();
    read_log(&mut BufReader::new(file), total_len)
}

/// Byte store underneath a [`Wal`].
pub trait LogFile: Send {
    /// Write all of `bytes` at the end of the log. May leave a partial write
    /// behind on error.
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()>;

    /// Cut the log back to its first `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Atomically swap the whole log for `contents`.
    fn replace(&mut self, contents: &[u8]) -> io::Result<()>;
}

/// Log file on local disk.
pub struct DiskLog {
    file: File,
    path: PathBuf,
}

impl DiskLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file, path: path.to_path_buf() })
    }
}

impl LogFile for DiskLog {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.file.sync_all()
    }

    /// Write a sibling temp file, fsync, then rename it over the log.
    fn replace(&mut self, contents: &[u8]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(contents)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

/// Append-only write-ahead log of ledger events.
///
/// Entry layout: `[u32 le: payload len][bincode Event][u32 le: crc32 of payload]`.
/// A torn tail left by a crash fails the length or CRC check and is dropped on replay.
///
/// The file never holds bytes past the last successful `flush_sync` for longer
/// than it takes to notice the failure: a failed flush discards what was
/// buffered and cuts the file back to `synced_len`. Until that cut succeeds
/// every flush fails.
pub struct Wal<F = DiskLog> {
    log: F,
    pending: Vec<u8>,
    pending_appends: u64,
    synced_len: u64,
    dirty_tail: bool,
    appends_since_compact: u64,
}

impl Wal<DiskLog> {
    /// Open the log at `path` for appending. A torn tail is cut off first so
    /// new frames follow the last intact one.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (_, intact) = scan(path)?;
        let mut log = DiskLog::open(path)?;
        let on_disk = log.file.metadata()?.len();
        if on_disk > intact {
            warn!(path = %path.display(), dropped = on_disk - intact, "cutting torn WAL tail");
            log.truncate(intact)?;
        }
        Ok(Self::over(log, intact))
    }

    /// Every intact event on disk, oldest first. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(scan(path)?.0)
    }
}

impl<F: LogFile> Wal<F> {
    /// Wrap a log whose first `synced_len` bytes are durable, intact frames.
    pub fn over(log: F, synced_len: u64) -> Self {
        Self {
            log,
            pending: Vec::new(),
            pending_appends: 0,
            synced_len,
            dirty_tail: false,
            appends_since_compact: 0,
        }
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event; durable only after the next `flush_sync`. On error
    /// nothing of this event is buffered.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        let mark = self.pending.len();
        if let Err(e) = encode_event(&mut self.pending, event) {
            self.pending.truncate(mark);
            return Err(e);
        }
        self.pending_appends += 1;
        Ok(())
    }

    /// Drop everything buffered since the last flush.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_appends = 0;
    }

    /// Write and fsync the buffered frames. On error the buffer is discarded
    /// and the file is cut back to its last synced length.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.dirty_tail {
            if let Err(e) = self.log.truncate(self.synced_len) {
                self.discard_pending();
                return Err(e);
            }
            self.dirty_tail = false;
        }

        let written = self.pending.len() as u64;
        let result = self.log.append(&self.pending).and_then(|()| self.log.sync());
        let appends = self.pending_appends;
        self.discard_pending();

        match result {
            Ok(()) => {
                self.synced_len += written;
                self.appends_since_compact += appends;
                Ok(())
            }
            Err(e) => {
                if let Err(cut) = self.log.truncate(self.synced_len) {
                    error!("WAL truncate to {} bytes failed: {cut}", self.synced_len);
                    self.dirty_tail = true;
                }
                Err(e)
            }
        }
    }

    pub fn synced_len(&self) -> u64 {
        self.synced_len
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the log with exactly `events`.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let mut contents = Vec::new();
        for event in events {
            encode_event(&mut contents, event)?;
        }
        self.log.replace(&contents)?;
        self.discard_pending();
        self.synced_len = contents.len() as u64;
        self.dirty_tail = false;
        self.appends_since_compact = 0;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IdentityId, Reservation, ResourceId};
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("daybook_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn committed(rid: u64, who: &str, days: &[(i32, u32, u32)]) -> Event {
        Event::ReservationsCommitted {
            resource_id: ResourceId(rid),
            reservations: days
                .iter()
                .map(|&(y, m, d)| {
                    Reservation::new(
                        ResourceId(rid),
                        IdentityId::from(who),
                        NaiveDate::from_ymd_opt(y, m, d).unwrap(),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![
            committed(1, "u1", &[(2025, 6, 10), (2025, 6, 11)]),
            Event::ReservationCancelled { id: Ulid::new(), resource_id: ResourceId(1) },
        ];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let path = tmp_path("torn_tail.wal");
        let event = committed(2, "u1", &[(2025, 1, 1)]);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_empty_log() {
        let path = tmp_path("missing.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn bad_crc_stops_replay() {
        let path = tmp_path("bad_crc.wal");
        let event = committed(3, "u1", &[(2024, 2, 29)]);
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        assert!(Wal::replay(&path).unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_shrinks_and_accepts_appends() {
        let path = tmp_path("compact.wal");
        let keep = committed(4, "u1", &[(2025, 3, 1)]);
        let later = committed(4, "u2", &[(2025, 3, 2)]);
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&keep).unwrap();
        for _ in 0..10 {
            let churn = committed(4, "u3", &[(2025, 4, 1), (2025, 4, 2)]);
            let Event::ReservationsCommitted { reservations, .. } = &churn else { unreachable!() };
            let id = reservations[0].id;
            wal.append(&churn).unwrap();
            wal.append(&Event::ReservationCancelled { id, resource_id: ResourceId(4) }).unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 21);
        let before = fs::metadata(&path).unwrap().len();

        wal.compact(std::slice::from_ref(&keep)).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted log should shrink: {after} < {before}");

        wal.append(&later).unwrap();
        assert_eq!(Wal::replay(&path).unwrap(), vec![keep, later]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_land_after_flush() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (1..=5).map(|d| committed(5, "u1", &[(2025, 5, d)])).collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            wal.flush_sync().unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn failed_flush_leaves_nothing_behind() {
        let log = testing::FlakyLog::default();
        let mut wal = Wal::over(log.clone(), 0);
        let kept = committed(6, "u1", &[(2025, 8, 1)]);
        let rejected = committed(6, "u2", &[(2025, 8, 2), (2025, 8, 3)]);
        let next = committed(6, "u3", &[(2025, 8, 4)]);

        wal.append(&kept).unwrap();
        let synced = wal.synced_len();

        log.set_failing(true);
        assert!(wal.append(&rejected).is_err());
        assert_eq!(log.bytes().len() as u64, synced);
        assert_eq!(wal.synced_len(), synced);
        assert_eq!(wal.appends_since_compact(), 1);

        log.set_failing(false);
        wal.append(&next).unwrap();
        assert_eq!(log.events(), vec![kept, next]);
        assert_eq!(wal.appends_since_compact(), 2);
    }

    #[test]
    fn discarded_batch_is_never_written() {
        let log = testing::FlakyLog::default();
        let mut wal = Wal::over(log.clone(), 0);
        wal.append_buffered(&committed(7, "u1", &[(2025, 9, 1)])).unwrap();
        wal.discard_pending();
        wal.flush_sync().unwrap();
        assert!(log.bytes().is_empty());
        assert_eq!(wal.appends_since_compact(), 0);
    }

    #[test]
    fn appends_after_torn_tail_survive_replay() {
        let path = tmp_path("torn_then_append.wal");
        let first = committed(8, "u1", &[(2025, 1, 1)]);
        let second = committed(8, "u2", &[(2025, 1, 2)]);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[40u8, 0, 0, 0, 7, 7, 7]).unwrap();
        }
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&second).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first, second]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn oversized_length_prefix_is_corrupt_tail() {
        let path = tmp_path("oversized_len.wal");
        let event = committed(9, "u1", &[(2025, 2, 2)]);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
            f.write_all(&[0u8; 16]).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
        let _ = fs::remove_file(&path);
    }
}
