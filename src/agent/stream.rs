//! Bounded event channel between a running agent and its consumer.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StrideError};
use crate::types::Event;

/// Default channel capacity for event streams.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Producer half. Every send and guarded await observes cancellation.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Send one event. Fails with [`StrideError::Cancelled`] once the
    /// consumer is gone.
    pub async fn emit(&self, event: impl Into<Event>) -> Result<()> {
        let event = event.into();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StrideError::Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| StrideError::Cancelled),
        }
    }

    /// Run `fut` unless cancellation arrives first.
    pub async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StrideError::Cancelled),
            out = fut => out,
        }
    }

    /// Sleep for `duration` unless cancelled.
    pub async fn sleep(&self, duration: std::time::Duration) -> Result<()> {
        self.guard(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Spawn a nested producer whose cancellation follows this sink's.
    pub fn spawn_child<F, Fut>(&self, producer: F) -> EventStream
    where
        F: FnOnce(EventSink) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        EventStream::spawn_with_token(DEFAULT_EVENT_BUFFER, self.cancel.child_token(), producer)
    }
}

/// Consumer half. Dropping it cancels the producer.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
    cancel: CancellationToken,
}

impl EventStream {
    /// A connected sink/stream pair.
    pub fn channel(capacity: usize) -> (EventSink, EventStream) {
        Self::channel_with_token(capacity, CancellationToken::new())
    }

    fn channel_with_token(capacity: usize, cancel: CancellationToken) -> (EventSink, EventStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            EventSink {
                tx,
                cancel: cancel.clone(),
            },
            EventStream { rx, cancel },
        )
    }

    /// Run `producer` as its own tokio task feeding the returned stream.
    ///
    /// A producer error other than cancellation is reported as a final
    /// `Error` event before the stream closes.
    pub fn spawn<F, Fut>(capacity: usize, producer: F) -> Self
    where
        F: FnOnce(EventSink) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::spawn_with_token(capacity, CancellationToken::new(), producer)
    }

    fn spawn_with_token<F, Fut>(capacity: usize, cancel: CancellationToken, producer: F) -> Self
    where
        F: FnOnce(EventSink) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (sink, stream) = Self::channel_with_token(capacity, cancel);
        let reporter = sink.clone();
        let fut = producer(sink);
        tokio::spawn(async move {
            match fut.await {
                Ok(()) => {}
                Err(StrideError::Cancelled) => tracing::debug!("event producer cancelled"),
                Err(e) => {
                    tracing::warn!(error = %e, "event producer failed");
                    let _ = reporter.emit(crate::types::Event::error(&e)).await;
                }
            }
        });
        stream
    }

    /// Receive the next event, or `None` once the producer finished.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Ask the producer to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain every remaining event.
    pub async fn collect_all(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn events_arrive_in_order_then_close() {
        let stream = EventStream::spawn(2, |sink| async move {
            for i in 0..5 {
                sink.emit(Event::message(i.to_string())).await?;
            }
            Ok(())
        });
        let texts: Vec<_> = stream
            .collect_all()
            .await
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::Message { message, .. } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn dropping_stream_cancels_producer() {
        let reached_end = Arc::new(AtomicBool::new(false));
        let flag = reached_end.clone();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let mut stream = EventStream::spawn(1, move |sink| async move {
            sink.emit(Event::message("first")).await?;
            let outcome = sink.sleep(Duration::from_secs(30)).await;
            let _ = done_tx.send(matches!(outcome, Err(StrideError::Cancelled)));
            outcome?;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(stream.recv().await.is_some());
        drop(stream);
        assert!(done_rx.await.unwrap());
        assert!(!reached_end.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn producer_error_becomes_error_event() {
        let events = EventStream::spawn(4, |_sink| async move {
            Err(StrideError::InvalidState("broken".into()))
        })
        .collect_all()
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0].kind, EventKind::Error { error } if error.contains("broken")));
    }

    #[tokio::test]
    async fn child_follows_parent_cancellation() {
        let (sink, stream) = EventStream::channel(1);
        let mut child = sink.spawn_child(|child_sink| async move {
            child_sink.sleep(Duration::from_secs(30)).await
        });
        drop(stream);
        assert!(child.recv().await.is_none());
    }
}
