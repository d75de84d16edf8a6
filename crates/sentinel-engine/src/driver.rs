//! Single-writer driver: the only code that mutates a shared engine.
//!
//! Producers never touch the engine directly. They push into one queue (see
//! [`forward`]) and a single task drains it through [`run_feed`], so the log
//! stays totally ordered however many producers there are.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use sentinel_events::redact::redact_event;
use sentinel_events::{EventFeed, EventJournal};
use sentinel_protocol::McpEvent;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::engine::TopologyEngine;

pub type SharedEngine = Arc<RwLock<TopologyEngine>>;

pub fn shared(engine: TopologyEngine) -> SharedEngine {
    Arc::new(RwLock::new(engine))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedSummary {
    pub events: u64,
    pub attributed: u64,
    pub topology_rebuilds: u64,
    /// Events whose payload had credentials or emails masked.
    pub redacted: u64,
}

/// Drain `feed` into `engine` until it closes, committing each event to
/// `journal` after its cycle. Payloads are redacted before the cycle.
///
/// The write lock is held only for the synchronous cycle, never across an
/// await, so cancelling this future between events leaves the engine intact.
#[instrument(skip_all)]
pub async fn run_feed<F>(
    engine: SharedEngine,
    feed: &mut F,
    journal: &mut EventJournal,
) -> Result<FeedSummary>
where
    F: EventFeed + ?Sized,
{
    let mut summary = FeedSummary::default();
    while let Some(mut event) = feed.next_event().await? {
        let masked = redact_event(&mut event);
        if masked > 0 {
            summary.redacted += 1;
            debug!(request_id = ?event.request_id, masked, "redacted payload");
        }
        let report = engine.write().ingest(event.clone());
        summary.events += 1;
        if report.method.is_some() {
            summary.attributed += 1;
        }
        if report.topology_rebuilt {
            summary.topology_rebuilds += 1;
        }
        journal.commit(event).await;
    }

    info!(
        events = summary.events,
        attributed = summary.attributed,
        topology_rebuilds = summary.topology_rebuilds,
        redacted = summary.redacted,
        "event feed closed"
    );
    Ok(summary)
}

/// Pump a producer feed into the single-writer queue.
///
/// Returns the number of events forwarded. Stops early, without error, when
/// the queue's consumer has gone away.
#[instrument(skip_all)]
pub async fn forward<F>(feed: &mut F, sender: mpsc::Sender<McpEvent>) -> Result<u64>
where
    F: EventFeed + ?Sized,
{
    let mut forwarded = 0;
    while let Some(event) = feed.next_event().await? {
        if sender.send(event).await.is_err() {
            debug!(forwarded, "single-writer queue closed, stopping producer");
            break;
        }
        forwarded += 1;
    }
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use sentinel_events::{ChannelFeed, EventStreamHub, JsonlFeed};
    use serde_json::json;
    use tokio::io::BufReader;

    use super::*;

    #[tokio::test]
    async fn run_feed_applies_events_in_order_and_publishes() -> Result<()> {
        let engine = shared(TopologyEngine::default());
        let hub = EventStreamHub::new(16);
        let mut live = hub.subscribe();
        let mut journal = EventJournal::new(hub);

        let (sender, mut feed) = ChannelFeed::bounded(8);
        sender.send(McpEvent::outbound("fs.read", 7)).await?;
        sender
            .send(McpEvent::inbound(7).with_payload(json!({"error": {"code": -1}})))
            .await?;
        drop(sender);

        let summary = run_feed(engine.clone(), &mut feed, &mut journal).await?;
        assert_eq!(
            summary,
            FeedSummary {
                events: 2,
                attributed: 2,
                topology_rebuilds: 1,
                redacted: 0,
            }
        );

        let guard = engine.read();
        assert_eq!(guard.log().len(), 2);
        assert_eq!(guard.tool_stats("fs.read").map(|s| s.errors), Some(1));
        drop(guard);

        assert_eq!(live.recv().await?.method(), Some("fs.read"));
        assert_eq!(live.recv().await?.request_id, Some(7));
        Ok(())
    }

    #[tokio::test]
    async fn payloads_are_redacted_before_commit() -> Result<()> {
        let engine = shared(TopologyEngine::default());
        let hub = EventStreamHub::new(4);
        let mut live = hub.subscribe();
        let mut journal = EventJournal::new(hub);

        let (sender, mut feed) = ChannelFeed::bounded(2);
        let secret = format!("sk-{}", "x".repeat(40));
        sender
            .send(McpEvent::outbound("llm.complete", 5).with_payload(json!({"key": secret})))
            .await?;
        drop(sender);

        let summary = run_feed(engine.clone(), &mut feed, &mut journal).await?;
        assert_eq!(summary.redacted, 1);

        let stored = engine.read().log().entries()[0].event.payload.clone();
        assert_eq!(stored, Some(json!({"key": "sk-xxxxx***"})));
        let published = live.recv().await?;
        assert_eq!(published.payload, stored);
        Ok(())
    }

    #[tokio::test]
    async fn producers_share_one_queue() -> Result<()> {
        let engine = shared(TopologyEngine::default());
        let mut journal = EventJournal::new(EventStreamHub::new(4));
        let (sender, mut queue) = ChannelFeed::bounded(4);

        let input = concat!(
            r#"{"timestamp":1,"direction":"Outbound","method":"slack.post","request_id":1,"payload":null}"#,
            "\n",
            r#"{"timestamp":2,"direction":"Inbound","request_id":1,"latency_ms":12,"payload":{"result":{}}}"#,
            "\n",
        );
        let mut file_feed = JsonlFeed::new("memory", BufReader::new(input.as_bytes()));
        let producer = {
            let sender = sender.clone();
            tokio::spawn(async move { forward(&mut file_feed, sender).await })
        };
        sender.send(McpEvent::outbound("fs.read", 2).at(3)).await?;
        drop(sender);

        let forwarded = producer.await??;
        let summary = run_feed(engine.clone(), &mut queue, &mut journal).await?;

        assert_eq!(forwarded, 2);
        assert_eq!(summary.events, 3);
        let guard = engine.read();
        assert_eq!(guard.tools().len(), 2);
        assert_eq!(guard.tool_stats("slack.post").map(|s| s.max_latency), Some(12));
        Ok(())
    }

    #[tokio::test]
    async fn silent_feed_leaves_engine_empty() -> Result<()> {
        let engine = shared(TopologyEngine::default());
        let mut journal = EventJournal::new(EventStreamHub::new(1));
        let (sender, mut feed) = ChannelFeed::bounded(1);

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            run_feed(engine.clone(), &mut feed, &mut journal),
        )
        .await;
        assert!(pending.is_err());
        assert!(engine.read().log().is_empty());
        drop(sender);
        Ok(())
    }
}
