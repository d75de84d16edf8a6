use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sentinel_protocol::McpEvent;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, instrument, warn};

pub mod redact;
pub mod tap;

pub use tap::FrameDecoder;

/// An ordered, append-only subscription of events.
///
/// `Ok(None)` means the feed is closed. A feed that never yields is valid.
#[async_trait]
pub trait EventFeed: Send {
    async fn next_event(&mut self) -> Result<Option<McpEvent>>;
}

/// Reads recorder-format JSONL, one event per line.
///
/// Blank lines are skipped. Lines that do not decode, including lines that
/// are not UTF-8, are logged and skipped so one corrupt record never stops
/// the feed.
pub struct JsonlFeed<R> {
    source: String,
    reader: R,
    line: Vec<u8>,
    line_no: u64,
    skipped: u64,
}

impl<R> JsonlFeed<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(source: impl Into<String>, reader: R) -> Self {
        Self {
            source: source.into(),
            reader,
            line: Vec::new(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl JsonlFeed<BufReader<File>> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .with_context(|| format!("failed opening event feed {path:?}"))?;
        Ok(Self::new(path.display().to_string(), BufReader::new(file)))
    }
}

impl JsonlFeed<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new("stdin", BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> EventFeed for JsonlFeed<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Result<Option<McpEvent>> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.line)
                .await
                .with_context(|| format!("failed reading event feed {}", self.source))?;
            if read == 0 {
                break;
            }
            self.line_no += 1;
            if self.line.trim_ascii().is_empty() {
                continue;
            }
            match serde_json::from_slice::<McpEvent>(&self.line) {
                Ok(event) => return Ok(Some(event)),
                Err(error) => {
                    self.skipped += 1;
                    warn!(
                        source = %self.source,
                        line = self.line_no,
                        %error,
                        "skipping malformed event line"
                    );
                }
            }
        }
        debug!(source = %self.source, lines = self.line_no, "event feed exhausted");
        Ok(None)
    }
}

/// Feed backed by an mpsc queue; the single-writer funnel for every producer.
pub struct ChannelFeed {
    receiver: mpsc::Receiver<McpEvent>,
}

impl ChannelFeed {
    pub fn new(receiver: mpsc::Receiver<McpEvent>) -> Self {
        Self { receiver }
    }

    /// A bounded queue plus the feed draining it.
    pub fn bounded(capacity: usize) -> (mpsc::Sender<McpEvent>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self::new(receiver))
    }
}

#[async_trait]
impl EventFeed for ChannelFeed {
    async fn next_event(&mut self) -> Result<Option<McpEvent>> {
        Ok(self.receiver.recv().await)
    }
}

/// Feed over a hub subscription. Lagged events are reported and skipped.
pub struct BroadcastFeed {
    receiver: broadcast::Receiver<McpEvent>,
}

impl BroadcastFeed {
    pub fn new(receiver: broadcast::Receiver<McpEvent>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl EventFeed for BroadcastFeed {
    async fn next_event(&mut self) -> Result<Option<McpEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "broadcast feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}

/// Fan-out of committed events to live subscribers (SSE, websockets).
#[derive(Clone, Debug)]
pub struct EventStreamHub {
    sender: broadcast::Sender<McpEvent>,
}

impl EventStreamHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: McpEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<McpEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<McpEvent> {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Appends every committed event to a JSONL file in recorder format.
#[derive(Debug)]
pub struct JsonlRecorder {
    path: PathBuf,
    file: File,
    written: u64,
}

impl JsonlRecorder {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create recorder dir {parent:?}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed opening event log {path:?}"))?;
        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn append(&mut self, event: &McpEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("failed serializing event")?;
        self.file.write_all(line.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await?;
        self.written += 1;
        Ok(())
    }
}

/// Post-commit side effects: optional recording, then live fan-out.
#[derive(Debug)]
pub struct EventJournal {
    recorder: Option<JsonlRecorder>,
    stream: EventStreamHub,
}

impl EventJournal {
    pub fn new(stream: EventStreamHub) -> Self {
        Self {
            recorder: None,
            stream,
        }
    }

    pub fn with_recorder(mut self, recorder: JsonlRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn stream(&self) -> &EventStreamHub {
        &self.stream
    }

    /// Recording failures are logged, never propagated: the event is already
    /// committed to the engine at this point.
    #[instrument(
        skip(self, event),
        fields(direction = event.direction.as_str(), request_id = ?event.request_id)
    )]
    pub async fn commit(&mut self, event: McpEvent) {
        if let Some(recorder) = self.recorder.as_mut()
            && let Err(error) = recorder.append(&event).await
        {
            warn!(path = ?recorder.path(), %error, "failed to record event");
        }
        self.stream.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use anyhow::Result;
    use sentinel_protocol::Direction;
    use tokio::fs;
    use tokio::io::BufReader;

    use super::*;

    fn unique_test_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}.jsonl"))
    }

    #[tokio::test]
    async fn jsonl_feed_skips_blank_and_malformed_lines() -> Result<()> {
        let input = concat!(
            r#"{"timestamp":1,"direction":"Outbound","method":"fs.read","request_id":7,"payload":{}}"#,
            "\n\n",
            "this is not json\n",
            r#"{"timestamp":2,"direction":"Inbound","request_id":7,"latency_ms":5,"payload":{"result":{}}}"#,
            "\n",
        );
        let mut feed = JsonlFeed::new("memory", BufReader::new(input.as_bytes()));

        let first = feed.next_event().await?.expect("first event");
        assert_eq!(first.method(), Some("fs.read"));
        let second = feed.next_event().await?.expect("second event");
        assert_eq!(second.direction, Direction::Inbound);
        assert_eq!(second.latency_ms, Some(5));
        assert!(feed.next_event().await?.is_none());
        assert_eq!(feed.skipped(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn jsonl_feed_skips_lines_that_are_not_utf8() -> Result<()> {
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(
            br#"{"timestamp":3,"direction":"Outbound","method":"fs.list","request_id":4,"payload":{}}"#,
        );
        let mut feed = JsonlFeed::new("memory", BufReader::new(input.as_slice()));

        let event = feed.next_event().await?.expect("valid line after garbage");
        assert_eq!(event.method(), Some("fs.list"));
        assert!(feed.next_event().await?.is_none());
        assert_eq!(feed.skipped(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn channel_feed_closes_when_senders_drop() -> Result<()> {
        let (sender, mut feed) = ChannelFeed::bounded(4);
        sender.send(McpEvent::outbound("fs.read", 1)).await?;
        drop(sender);

        assert!(feed.next_event().await?.is_some());
        assert!(feed.next_event().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn broadcast_feed_receives_published_events() -> Result<()> {
        let hub = EventStreamHub::new(8);
        let mut feed = BroadcastFeed::new(hub.subscribe());
        hub.publish(McpEvent::inbound(3));

        let event = feed.next_event().await?.expect("published event");
        assert_eq!(event.request_id, Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn recorder_output_replays_through_feed() -> Result<()> {
        let path = unique_test_path("sentinel-recorder");
        let mut journal = EventJournal::new(EventStreamHub::new(8))
            .with_recorder(JsonlRecorder::open(&path).await?);
        let mut live = journal.stream().subscribe();

        journal
            .commit(McpEvent::outbound("github.createIssue", 11).at(10))
            .await;
        journal.commit(McpEvent::inbound(11).at(20).with_latency(9)).await;
        assert_eq!(live.recv().await?.request_id, Some(11));

        let mut feed = JsonlFeed::open(&path).await?;
        let mut replayed = Vec::new();
        while let Some(event) = feed.next_event().await? {
            replayed.push(event);
        }
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].method(), Some("github.createIssue"));
        assert_eq!(replayed[1].latency_ms, Some(9));

        let _ = fs::remove_file(path).await;
        Ok(())
    }
}
