//! Scripted stream sources for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use reqwest::StatusCode;
use url::Url;

use crate::RecordError;
use crate::events::{SessionEvent, SessionObserver};
use crate::source::{ByteStream, StreamSource};

/// Behaviour of one `open` call.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// The connection cannot be established.
    Refuse,
    /// One chunk every `interval`, forever.
    Steady {
        interval: Duration,
        chunk_size: usize,
    },
    /// `chunks` chunks, then a transport error.
    FailAfter {
        interval: Duration,
        chunks: usize,
        chunk_size: usize,
    },
    /// `chunks` chunks, then the server closes the stream.
    EndAfter {
        interval: Duration,
        chunks: usize,
        chunk_size: usize,
    },
    /// `chunks` chunks right away, then silence without closing.
    Stall { chunks: usize, chunk_size: usize },
}

impl Script {
    pub fn steady(interval: Duration, chunk_size: usize) -> Self {
        Self::Steady {
            interval,
            chunk_size,
        }
    }
}

/// Plays one [`Script`] per `open` call; the last one repeats.
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
    opens: AtomicU32,
}

impl ScriptedSource {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            opens: AtomicU32::new(0),
        }
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Script {
        let mut scripts = self.scripts.lock();
        if scripts.len() > 1 {
            scripts.pop_front().unwrap_or(Script::Refuse)
        } else {
            scripts.front().copied().unwrap_or(Script::Refuse)
        }
    }
}

fn paced(interval: Duration, chunks: Option<usize>, chunk_size: usize) -> ByteStream {
    stream::unfold(0usize, move |sent| async move {
        if chunks.is_some_and(|limit| sent >= limit) {
            return None;
        }
        tokio::time::sleep(interval).await;
        Some((Ok(Bytes::from(vec![0xA5; chunk_size])), sent + 1))
    })
    .boxed()
}

#[async_trait]
impl StreamSource for ScriptedSource {
    async fn open(&self, url: &Url) -> Result<ByteStream, RecordError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.next_script() {
            Script::Refuse => Err(RecordError::HttpStatus {
                status: StatusCode::SERVICE_UNAVAILABLE,
                url: url.to_string(),
            }),
            Script::Steady {
                interval,
                chunk_size,
            } => Ok(paced(interval, None, chunk_size)),
            Script::FailAfter {
                interval,
                chunks,
                chunk_size,
            } => Ok(paced(interval, Some(chunks), chunk_size)
                .chain(stream::once(async {
                    Err(RecordError::Timeout(Duration::ZERO))
                }))
                .boxed()),
            Script::EndAfter {
                interval,
                chunks,
                chunk_size,
            } => Ok(paced(interval, Some(chunks), chunk_size)),
            Script::Stall { chunks, chunk_size } => Ok(stream::iter(
                (0..chunks).map(move |_| Ok(Bytes::from(vec![0x5A; chunk_size]))),
            )
            .chain(stream::pending())
            .boxed()),
        }
    }
}

/// Keeps every event for later inspection.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_event(&self, event: &SessionEvent) {
        self.events.lock().push(event.clone());
    }
}
