// src/session/queue.rs

//! Per-session serialized commit queue
//!
//! Every session owns one worker task fed by an unbounded channel. Commit
//! attempts are processed strictly one after another, never concurrently,
//! which is what lets the commit pipeline be written as straight-line code:
//! duplicate commit requests and permission retries simply enqueue another
//! attempt behind the current one.
//!
//! The worker holds only a weak reference to its session, so dropping the
//! last strong reference (the registry removing the session) shuts the
//! worker down.

use super::Session;
use std::sync::Weak;
use tokio::sync::mpsc;
use tracing::trace;

/// Work items a session worker processes
#[derive(Debug)]
pub(crate) enum CommitSignal {
    /// Run one commit attempt
    Attempt,
}

/// Sending half of a session's serialized queue
#[derive(Debug)]
pub(crate) struct CommitQueue {
    tx: mpsc::UnboundedSender<CommitSignal>,
}

impl CommitQueue {
    /// Spawn the worker task for `session` and return the queue handle.
    pub(crate) fn start(session: Weak<Session>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                trace!("session {} processing {:?}", session.id(), signal);
                match signal {
                    CommitSignal::Attempt => session.run_commit_attempt().await,
                }
            }
        });

        Self { tx }
    }

    /// Enqueue one commit attempt. Never blocks; a closed worker (session
    /// already gone) makes this a no-op.
    pub(crate) fn enqueue(&self) {
        let _ = self.tx.send(CommitSignal::Attempt);
    }
}
