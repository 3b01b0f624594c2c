//! Append-only journal of store events with a group-commit writer task.
//!
//! Frame per record: `[u32 len LE][bincode Event][u32 crc32 LE]`. A torn or
//! corrupt tail is discarded on replay and cut off the file on recovery, so
//! later appends follow the last good frame.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability;
use crate::repo::RepoError;

const WRITER_QUEUE_DEPTH: usize = 4096;

/// Frame overhead around the bincode payload: length prefix and checksum.
const FRAME_OVERHEAD: u64 = 8;

/// Returns the number of bytes written.
fn write_frame(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(payload.len() as u64 + FRAME_OVERHEAD)
}

/// Read `buf.len()` bytes; `Ok(false)` on a clean or torn end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next valid event and its frame size, or `None` at end of file or at the
/// first damaged frame.
fn read_frame(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
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
        .map(|event| (event, payload.len() as u64 + FRAME_OVERHEAD)))
}

/// Valid events on disk and the byte length they occupy.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0;
    while let Some((event, size)) = read_frame(&mut reader)? {
        events.push(event);
        valid_len += size;
    }
    Ok((events, valid_len))
}

pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length covered by fsynced, whole frames.
    committed_len: u64,
    /// Bytes and frames buffered since the last successful flush.
    pending_len: u64,
    pending_appends: u64,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the journal at `path`, dropping any damaged tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::recover(path).map(|(wal, _)| wal)
    }

    /// Replay the journal, cut it back to its last whole frame, and open it
    /// for appending. New records always land directly after valid ones.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > valid_len {
            tracing::warn!(
                "WAL {}: discarding {} damaged trailing bytes",
                path.display(),
                on_disk - valid_len
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        let wal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            committed_len: valid_len,
            pending_len: 0,
            pending_appends: 0,
            appends_since_compact: 0,
        };
        Ok((wal, events))
    }

    /// Append and fsync a single event. Production code goes through
    /// [`WalHandle`], which batches.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        self.pending_len += write_frame(&mut self.writer, event)?;
        self.pending_appends += 1;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.committed_len += self.pending_len;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    /// Throw away everything since the last successful flush, on disk and in
    /// the buffer, so a failed batch never resurfaces on replay.
    pub fn rollback(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the unflushed bytes instead of writing them.
        drop(stale.into_parts());
        let file = self.writer.get_ref();
        file.set_len(self.committed_len)?;
        file.sync_all()?;
        self.appends_since_compact -= self.pending_appends;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the journal with `events`: write a temp file, fsync, rename over.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        let mut len = 0;
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                len += write_frame(&mut writer, event)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.committed_len = len;
        self.pending_len = 0;
        self.pending_appends = 0;
        self.appends_since_compact = 0;
        Ok(())
    }

    /// All valid events on disk, oldest first. A missing file is an empty journal.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}

// ── Group-commit writer ─────────────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Cloneable handle to the writer task that owns the [`Wal`].
#[derive(Clone)]
pub struct WalHandle {
    tx: mpsc::Sender<WalCommand>,
}

impl WalHandle {
    /// Move `wal` into a background writer task. Requires a tokio runtime.
    pub fn spawn(wal: Wal) -> Self {
        let (tx, rx) = mpsc::channel(WRITER_QUEUE_DEPTH);
        tokio::spawn(writer_loop(wal, rx));
        Self { tx }
    }

    /// Durably append one event. Returns once it is fsynced.
    pub async fn append(&self, event: Event) -> Result<(), RepoError> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::Append { event, response })
            .await
            .map_err(|_| RepoError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepoError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| RepoError::Wal(e.to_string()))
    }

    pub async fn compact(&self, events: Vec<Event>) -> Result<(), RepoError> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::Compact { events, response })
            .await
            .map_err(|_| RepoError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepoError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| RepoError::Wal(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (response, rx) = oneshot::channel();
        if self
            .tx
            .send(WalCommand::AppendsSinceCompact { response })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Block for the first append, drain whatever else is already queued, then
/// fsync once and answer the whole batch.
async fn writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_control(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let failure = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync())
        .err();
    if failure.is_some() {
        if let Err(e) = wal.rollback() {
            tracing::error!("WAL rollback failed: {e}");
        }
    }

    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    if let Some(e) = &failure {
        tracing::error!("WAL batch of {} failed: {e}", batch.len());
    }
    for (_, tx) in batch {
        let result = match &failure {
            None => Ok(()),
            Some(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(result);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}
