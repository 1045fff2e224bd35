//! Session lifetime binding.
//!
//! # Responsibilities
//! - Destroy a session's container exactly once, whichever trigger fires
//!   first (attach failure, output EOF, relay failure, client disconnect)
//! - Bridge the attached output stream onto the client response pipe so a
//!   client disconnect is observable while output is still flowing
//! - Track active sessions for draining and metrics

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::api::types::ContainerId;
use crate::containerizer::Containerizer;
use crate::io::pipe::{pipe, Reader};
use crate::observability::metrics;

/// Global counter for session IDs; uniqueness is all we need.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a debug session, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One-shot latch that schedules destruction of a session's container.
///
/// Every terminal trigger calls [`SessionDestroyer::destroy`]; the first
/// caller wins and the rest are no-ops, so overlapping triggers (EOF racing
/// a disconnect, say) cannot double-destroy.
#[derive(Clone)]
pub struct SessionDestroyer {
    inner: Arc<DestroyerInner>,
}

struct DestroyerInner {
    containerizer: Arc<dyn Containerizer>,
    container_id: ContainerId,
    fired: AtomicBool,
}

impl SessionDestroyer {
    pub fn new(containerizer: Arc<dyn Containerizer>, container_id: ContainerId) -> Self {
        Self {
            inner: Arc::new(DestroyerInner {
                containerizer,
                container_id,
                fired: AtomicBool::new(false),
            }),
        }
    }

    /// Synchronously schedule destruction; only the first call per session
    /// does anything. Destroy failures are logged, never surfaced.
    pub fn destroy(&self, trigger: &'static str) {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::warn!(
            container_id = %self.inner.container_id,
            trigger,
            "Destroying nested container session"
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(error) = inner.containerizer.destroy(&inner.container_id).await {
                tracing::error!(
                    container_id = %inner.container_id,
                    error = %error,
                    "Failed to destroy nested container"
                );
            }
        });
    }

    #[cfg(test)]
    pub fn fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }
}

/// Bridge the attached output onto a fresh client-facing pipe, binding the
/// container's lifetime to the stream.
///
/// The extra pipe stage exists so the client side of the relay is ours: its
/// reader close (the client connection going away) is observable here even
/// when no output is flowing, and triggers destruction.
pub fn bind_session(
    mut output: Reader,
    destroyer: SessionDestroyer,
    guard: SessionGuard,
) -> Reader {
    let (mut writer, client) = pipe();
    let id = guard.id();

    tokio::spawn(async move {
        let _guard = guard;
        loop {
            let client_gone = writer.reader_closed();
            tokio::select! {
                _ = client_gone => {
                    tracing::debug!(session = %id, "Session client disconnected");
                    destroyer.destroy("client disconnect");
                    return;
                }
                chunk = output.read() => match chunk {
                    None => {
                        writer.close();
                        destroyer.destroy("output EOF");
                        return;
                    }
                    Some(Ok(bytes)) => {
                        if writer.write(bytes).await.is_err() {
                            destroyer.destroy("client disconnect");
                            return;
                        }
                    }
                    Some(Err(error)) => {
                        writer.fail(error.to_string());
                        destroyer.destroy("relay failure");
                        return;
                    }
                },
            }
        }
    });

    client
}

/// Tracks active attach/session streams for draining and metrics.
#[derive(Clone)]
pub struct SessionTracker {
    active: Arc<AtomicU64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a new active session. The guard decrements on drop.
    pub fn track(&self) -> SessionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        metrics::session_opened();
        SessionGuard {
            active: Arc::clone(&self.active),
            id: SessionId::next(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until every tracked session has ended.
    pub async fn wait_idle(&self) {
        while self.active.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard tracking one session's lifetime.
pub struct SessionGuard {
    active: Arc<AtomicU64>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        metrics::session_closed();
        tracing::trace!(session = %self.id, "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::api::types::{CommandInfo, ContainerInfo};
    use crate::containerizer::{
        ContainerClass, ContainerizerError, ContainerTermination, IoConnection,
    };

    #[derive(Default)]
    struct RecordingContainerizer {
        destroyed: Mutex<Vec<ContainerId>>,
    }

    #[async_trait]
    impl Containerizer for RecordingContainerizer {
        async fn launch(
            &self,
            _: &ContainerId,
            _: &CommandInfo,
            _: Option<&ContainerInfo>,
            _: Option<&str>,
            _: ContainerClass,
        ) -> Result<bool, ContainerizerError> {
            Ok(true)
        }

        async fn destroy(&self, id: &ContainerId) -> Result<bool, ContainerizerError> {
            self.destroyed.lock().unwrap().push(id.clone());
            Ok(true)
        }

        async fn wait(
            &self,
            _: &ContainerId,
        ) -> Result<Option<ContainerTermination>, ContainerizerError> {
            Ok(None)
        }

        async fn attach(&self, _: &ContainerId) -> Result<IoConnection, ContainerizerError> {
            Err(ContainerizerError("not attachable".into()))
        }
    }

    fn destroyer_with(containerizer: &Arc<RecordingContainerizer>) -> SessionDestroyer {
        SessionDestroyer::new(containerizer.clone(), ContainerId::new("debug"))
    }

    #[tokio::test]
    async fn destroy_fires_exactly_once() {
        let containerizer = Arc::new(RecordingContainerizer::default());
        let destroyer = destroyer_with(&containerizer);

        destroyer.destroy("output EOF");
        destroyer.destroy("client disconnect");
        destroyer.clone().destroy("relay failure");
        tokio::task::yield_now().await;

        assert_eq!(containerizer.destroyed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn output_eof_destroys_and_ends_the_stream() {
        let containerizer = Arc::new(RecordingContainerizer::default());
        let destroyer = destroyer_with(&containerizer);
        let tracker = SessionTracker::new();

        let (mut writer, output) = pipe();
        let mut client = bind_session(output, destroyer.clone(), tracker.track());

        writer.write(Bytes::from_static(b"out")).await.unwrap();
        assert_eq!(client.read().await, Some(Ok(Bytes::from_static(b"out"))));

        writer.close();
        assert_eq!(client.read().await, None);

        tracker.wait_idle().await;
        assert!(destroyer.fired());
    }

    #[tokio::test]
    async fn client_disconnect_destroys_while_output_is_idle() {
        let containerizer = Arc::new(RecordingContainerizer::default());
        let destroyer = destroyer_with(&containerizer);
        let tracker = SessionTracker::new();

        let (_writer, output) = pipe();
        let client = bind_session(output, destroyer.clone(), tracker.track());

        client.close();
        tracker.wait_idle().await;
        assert!(destroyer.fired());
    }

    #[tokio::test]
    async fn eof_then_disconnect_does_not_double_destroy() {
        let containerizer = Arc::new(RecordingContainerizer::default());
        let destroyer = destroyer_with(&containerizer);
        let tracker = SessionTracker::new();

        let (writer, output) = pipe();
        let client = bind_session(output, destroyer.clone(), tracker.track());

        writer.close();
        tracker.wait_idle().await;
        client.close();
        tokio::task::yield_now().await;

        assert_eq!(containerizer.destroyed.lock().unwrap().len(), 1);
    }
}
