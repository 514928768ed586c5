use monitor_core::UsageRecord;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Hand-off capacity between the transport and the persistence consumer.
pub const QUEUE_CAPACITY: usize = 1024;

/// Bounded hand-off from the ingestion path to the store consumer. The
/// enqueue never blocks the transport: a full queue drops the newest
/// record.
#[derive(Clone)]
pub struct RecordQueue {
    tx: mpsc::Sender<UsageRecord>,
}

impl RecordQueue {
    /// Returns whether the record was queued. Drops are silent toward the
    /// caller; bounded memory wins over completeness under overload.
    pub fn push(&self, record: UsageRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("record queue full, dropping newest record");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("record queue consumer gone, dropping record");
                false
            }
        }
    }
}

pub fn record_queue(capacity: usize) -> (RecordQueue, mpsc::Receiver<UsageRecord>) {
    let (tx, rx) = mpsc::channel(capacity);
    (RecordQueue { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use monitor_core::TokenCounts;

    fn record(session: &str) -> UsageRecord {
        UsageRecord {
            session_id: session.to_string(),
            timestamp: Utc::now(),
            model: "claude-opus-4".to_string(),
            tokens: TokenCounts::default(),
            cost_usd: 0.0,
            duration_ms: 0,
        }
    }

    #[test]
    fn full_queue_drops_newest_without_blocking() {
        let (queue, mut rx) = record_queue(2);
        assert!(queue.push(record("s1")));
        assert!(queue.push(record("s2")));
        assert!(!queue.push(record("s3")));

        assert_eq!(rx.try_recv().expect("first").session_id, "s1");
        assert_eq!(rx.try_recv().expect("second").session_id, "s2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_queue_discards_without_error() {
        let (queue, rx) = record_queue(2);
        drop(rx);
        assert!(!queue.push(record("s1")));
    }
}
