use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::process::ClaudeProcess;
use crate::types::{Message, QueryOptions};
use crate::Result;

// ─── QueryStream ──────────────────────────────────────────────────────────

/// An async stream of [`Message`]s from a Claude subprocess.
///
/// Backed by a Tokio mpsc channel. A background task owns the
/// [`ClaudeProcess`] and forwards messages until it sees the terminal
/// `Result` message or the process exits. Dropping `QueryStream` closes the
/// receiver; the background task notices via `tx.closed()` and kills the
/// subprocess, so [`crate::runner::run`]'s timeout also terminates a stuck
/// `claude`.
pub struct QueryStream {
    rx: mpsc::Receiver<Result<Message>>,
}

impl QueryStream {
    pub(crate) fn new(prompt: String, opts: QueryOptions) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut process = match ClaudeProcess::spawn(&prompt, &opts).await {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut got_result = false;
            loop {
                tokio::select! {
                    // Receiver dropped: timeout, or the caller stopped
                    // consuming. Stop reading and take the process down.
                    _ = tx.closed() => {
                        process.kill().await;
                        return;
                    }
                    next = process.next_message() => match next {
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            break;
                        }
                        Ok(None) => break, // EOF, process exited
                        Ok(Some(msg)) => {
                            let is_terminal = matches!(msg, Message::Result(_));
                            if is_terminal {
                                got_result = true;
                            }
                            if tx.send(Ok(msg)).await.is_err() {
                                break;
                            }
                            if is_terminal {
                                break;
                            }
                        }
                    }
                }
            }

            // If the process exited without a Result message, check for a
            // non-zero exit code and surface captured stderr.
            if !got_result {
                if let Some(exit_err) = process.wait_exit_error().await {
                    let _ = tx.send(Err(exit_err)).await;
                }
            }

            process.kill().await;
        });

        QueryStream { rx }
    }

    /// Test-only constructor: wrap a raw mpsc receiver as a `QueryStream`.
    /// Used by `runner` tests to inject pre-built message sequences.
    #[cfg(test)]
    pub(crate) fn from_channel(rx: mpsc::Receiver<Result<Message>>) -> Self {
        Self { rx }
    }
}

impl Stream for QueryStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
