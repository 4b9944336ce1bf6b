//! In-memory sources and sinks backed by crossbeam channels.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::core::column::{ColumnBatch, Row};
use crate::infra::emitter::EventSink;
use crate::infra::receptor::EventSource;

/// Event source reading rows from a channel.
///
/// Once every sender is gone and the channel is drained, polling fails so the
/// receptor eventually parks in ERROR.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Row>,
}

impl ChannelSource {
    /// Create a source and the sender feeding it.
    #[must_use]
    pub fn new() -> (Sender<Row>, Self) {
        let (tx, rx) = unbounded();
        (tx, Self { rx })
    }

    /// Wrap an existing receiver.
    #[must_use]
    pub const fn from_receiver(rx: Receiver<Row>) -> Self {
        Self { rx }
    }
}

impl EventSource for ChannelSource {
    fn poll(&mut self, max_rows: usize) -> Result<Vec<Row>, String> {
        let mut rows = Vec::new();
        while rows.len() < max_rows {
            match self.rx.try_recv() {
                Ok(row) => rows.push(row),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if rows.is_empty() {
                        return Err("channel source disconnected".into());
                    }
                    break;
                }
            }
        }
        Ok(rows)
    }
}

/// Event sink forwarding each drained batch as rows to a channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<Vec<Row>>,
}

impl ChannelSink {
    /// Create a sink and the receiver observing it.
    #[must_use]
    pub fn new() -> (Self, Receiver<Vec<Row>>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, batch: &ColumnBatch) -> Result<(), String> {
        self.tx
            .send(batch.rows())
            .map_err(|_| "channel sink disconnected".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::column::Value;

    #[test]
    fn test_poll_respects_batch_size() {
        let (tx, mut source) = ChannelSource::new();
        for i in 0..5 {
            tx.send(vec![Value::Int(i)]).unwrap();
        }
        assert_eq!(source.poll(3).unwrap().len(), 3);
        assert_eq!(source.poll(3).unwrap().len(), 2);
        assert!(source.poll(3).unwrap().is_empty());
        drop(tx);
        assert!(source.poll(3).is_err());
    }
}
