//! Bounded worker pool
//!
//! Reads inbound messages as JSON lines, processes each in its own task with
//! at most `max_concurrent` in flight, and writes one outcome line per message
//! as it completes. Output order follows completion, not input.

use crate::pipeline::Moderator;
use crate::source::{InboundMessage, Outcome};
use modshield_core::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Totals for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages processed
    pub processed: u64,
    /// Lines that could not be parsed
    pub rejected: u64,
}

/// Process every line from `reader`, writing outcomes to `writer`
pub async fn process_lines<R, W>(
    moderator: Arc<Moderator>,
    reader: R,
    mut writer: W,
    max_concurrent: usize,
) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let (tx, mut rx) = mpsc::channel::<Outcome>(max_concurrent.max(1) * 2);

    let output = tokio::spawn(async move {
        let mut written = 0u64;
        while let Some(outcome) = rx.recv().await {
            let mut line = serde_json::to_vec(&outcome)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            written += 1;
        }
        writer.flush().await?;
        Ok::<u64, modshield_core::Error>(written)
    });

    let mut summary = RunSummary::default();
    let mut tasks = JoinSet::new();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let message = match InboundMessage::parse_line(&line) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Rejected inbound line");
                summary.rejected += 1;
                continue;
            }
        };

        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let moderator = moderator.clone();
        let tx = tx.clone();
        tasks.spawn(async move {
            let outcome = moderator.process(&message).await;
            drop(permit);
            let _ = tx.send(outcome).await;
        });

        // Reap finished tasks so the set stays bounded
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Message task failed");
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Message task failed");
        }
    }
    drop(tx);

    summary.processed = match output.await {
        Ok(written) => written?,
        Err(e) => return Err(modshield_core::Error::internal(format!("output task failed: {}", e))),
    };

    if let Err(e) = moderator.persist() {
        warn!(error = %e, "Failed to persist state");
    }
    info!(processed = summary.processed, rejected = summary.rejected, "Input drained");
    Ok(summary)
}
