// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pending authorization transactions and authorization-code replay guard.
//!
//! A transaction lives from the redirect to the provider until the callback
//! redeems it (once) or it expires. Codes the provider issued are remembered
//! so a code resent out of band is refused even after its transaction is gone.

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{AppError, Result};

/// A login attempt waiting for the provider to redirect back.
#[derive(Debug, Clone)]
struct AuthTransaction {
    code_verifier: String,
    request_id: String,
    user_id: String,
    created_at: Instant,
}

/// What a successful redemption hands back to the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemedTransaction {
    pub code_verifier: String,
    pub request_id: String,
    pub user_id: String,
}

/// Counts from one reaper sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    pub expired_transactions: usize,
    pub cleared_codes: usize,
}

/// Concurrent store of pending transactions keyed by state token.
pub struct AuthTransactionStore {
    transactions: DashMap<String, AuthTransaction>,
    used_codes: DashSet<String>,
    ttl: Duration,
    used_code_ceiling: usize,
}

impl AuthTransactionStore {
    pub fn new(ttl: Duration, used_code_ceiling: usize) -> Self {
        Self {
            transactions: DashMap::new(),
            used_codes: DashSet::new(),
            ttl,
            used_code_ceiling,
        }
    }

    /// Record a pending transaction. An existing entry for `state` is replaced.
    pub fn begin(&self, state: &str, code_verifier: &str, request_id: &str, user_id: &str) {
        let previous = self.transactions.insert(
            state.to_string(),
            AuthTransaction {
                code_verifier: code_verifier.to_string(),
                request_id: request_id.to_string(),
                user_id: user_id.to_string(),
                created_at: Instant::now(),
            },
        );

        if previous.is_some() {
            tracing::warn!(request_id, "Replaced existing authorization transaction");
        }
        tracing::debug!(request_id, user_id, "Authorization transaction started");
    }

    /// Remove and return the transaction for `state`.
    ///
    /// Removal is atomic, so of any number of concurrent callers with the same
    /// state at most one succeeds. Expired transactions are never returned.
    pub fn redeem(&self, state: &str) -> Result<RedeemedTransaction> {
        let (_, transaction) = self
            .transactions
            .remove(state)
            .ok_or_else(|| AppError::NotFound("authorization transaction".to_string()))?;

        if transaction.created_at.elapsed() >= self.ttl {
            tracing::info!(
                request_id = %transaction.request_id,
                "Authorization transaction expired before redemption"
            );
            return Err(AppError::NotFound("authorization transaction".to_string()));
        }

        Ok(RedeemedTransaction {
            code_verifier: transaction.code_verifier,
            request_id: transaction.request_id,
            user_id: transaction.user_id,
        })
    }

    /// Remember a redeemed authorization code.
    ///
    /// Returns `true` if the code was not seen before.
    pub fn mark_code_used(&self, code: &str) -> bool {
        self.used_codes.insert(code.to_string())
    }

    pub fn is_code_used(&self, code: &str) -> bool {
        self.used_codes.contains(code)
    }

    pub fn pending_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn used_code_count(&self) -> usize {
        self.used_codes.len()
    }

    /// Drop expired transactions, and clear the used-code set once it
    /// outgrows its ceiling. Codes are single-use and short-lived upstream.
    pub fn reap(&self) -> ReapStats {
        let before = self.transactions.len();
        self.transactions
            .retain(|_, transaction| transaction.created_at.elapsed() < self.ttl);
        let expired_transactions = before.saturating_sub(self.transactions.len());

        let code_count = self.used_codes.len();
        let cleared_codes = if code_count > self.used_code_ceiling {
            self.used_codes.clear();
            code_count
        } else {
            0
        };

        if expired_transactions > 0 || cleared_codes > 0 {
            tracing::debug!(
                expired_transactions,
                cleared_codes,
                "Authorization store sweep"
            );
        }

        ReapStats {
            expired_transactions,
            cleared_codes,
        }
    }

    /// Run [`reap`](Self::reap) every `period` until the handle is shut down.
    pub fn spawn_reaper(self: &Arc<Self>, period: Duration) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let store = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        store.reap();
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Authorization store reaper received shutdown signal");
                        break;
                    }
                }
            }
        });

        ReaperHandle { shutdown_tx, task }
    }
}

/// Handle to the background reaper task.
pub struct ReaperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Authorization store reaper exited abnormally");
        }
    }
}
