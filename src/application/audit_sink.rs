use crate::config::AuditConfig;
use crate::domain::audit::{AuditEvent, AuditRecord};
use crate::domain::ports::AuditBackendRef;
use crate::domain::request::RequestContext;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Fire-and-forget write path for the audit trail.
///
/// Events go onto a bounded queue drained by background workers. When the queue
/// is full the new event is dropped and counted; callers are never blocked and
/// never see a backend failure.
pub struct AuditSink {
    tx: mpsc::Sender<AuditEvent>,
    dropped: AtomicU64,
}

/// Handles of the workers draining an [`AuditSink`].
pub struct AuditWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl AuditSink {
    /// Starts the workers and returns the sink feeding them.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(backend: AuditBackendRef, config: &AuditConfig) -> (Arc<Self>, AuditWorkers) {
        let (tx, rx) = mpsc::channel::<AuditEvent>(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..config.workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let backend = Arc::clone(&backend);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(event) = next else { break };
                        let action = event.action;
                        if let Err(e) = backend.write(AuditRecord::stamp(event)).await {
                            error!(worker, %action, error = %e, "Failed to write audit record");
                        }
                    }
                    debug!(worker, "Audit worker stopped");
                })
            })
            .collect();

        let sink = Arc::new(Self {
            tx,
            dropped: AtomicU64::new(0),
        });
        (sink, AuditWorkers { handles })
    }

    /// Queues `event` for writing. Never blocks.
    pub fn append(&self, event: AuditEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(action = %event.action, actor = %event.actor_name, "Audit queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(action = %event.action, actor = %event.actor_name, "Audit workers stopped, event dropped");
            }
        }
    }

    /// Stamps `event` with the caller's origin, then queues it.
    pub fn record(&self, ctx: &RequestContext, event: AuditEvent) {
        self.append(event.with_origin(ctx.origin().as_ref()));
    }

    /// Events discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditWorkers {
    /// Waits until the queue is drained. Only returns once every `AuditSink`
    /// handle has been dropped, since workers keep listening until then.
    pub async fn shutdown(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Audit worker panicked");
            }
        }
    }
}
