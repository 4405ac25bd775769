// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight credential renewal.
//!
//! The first request rejected with 401 becomes the leader of a renewal cycle:
//! it parks itself at the head of the queue and runs the renewal strategy.
//! Every other 401 that arrives while the cycle is `Refreshing` parks behind
//! it. On success the queue is drained in enqueue order, each waiter getting
//! the outcome of its own replay; on failure every waiter is rejected and the
//! session is abandoned. A 401 that arrives after the session was abandoned
//! is rejected without starting another cycle.
//!
//! ```text
//! Idle --401--> Refreshing --ok--> Draining --> Idle
//!                    |
//!                    +--err/timeout--> Idle (waiters rejected, session cleared)
//! ```

pub mod strategy;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::transport::RequestDescriptor;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Refreshing,
    Draining,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Refreshing => "refreshing",
            Self::Draining => "draining",
        }
    }
}

/// What the coordinator drives during a cycle.
pub trait RecoveryTarget: Send + Sync {
    /// Access token currently committed, if any.
    fn current_token(&self) -> Option<String>;

    /// Obtain a new credential and commit it.
    fn renew(&self) -> BoxFuture<'_, Result<(), ClientError>>;

    /// Re-issue `descriptor` with the committed credential.
    fn replay(&self, descriptor: RequestDescriptor) -> BoxFuture<'_, Result<Value, ClientError>>;

    /// Renewal failed: wipe the session and send the user to the login entry.
    fn abandon(&self, reason: &ClientError);

    /// Renewal succeeded and `replayed` parked requests were re-issued.
    fn renewed(&self, _replayed: usize) {}
}

type Settle = oneshot::Sender<Result<Value, ClientError>>;

struct Waiter {
    descriptor: RequestDescriptor,
    settle: Settle,
}

enum Entry {
    Lead,
    Parked,
    Replay(RequestDescriptor),
    Reject,
}

struct State {
    phase: Phase,
    queue: VecDeque<Waiter>,
}

/// Owns the in-flight flag and the pending-request queue. One per session.
pub struct RefreshCoordinator {
    state: Mutex<State>,
    timeout: Duration,
    cycles: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State { phase: Phase::Idle, queue: VecDeque::new() }),
            timeout,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Number of requests parked behind the current cycle.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Renewal cycles started since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Recover a request that was rejected with 401.
    ///
    /// `sent_with` is the access token the rejected request carried.
    pub async fn recover<T>(
        &self,
        target: &T,
        descriptor: RequestDescriptor,
        sent_with: Option<&str>,
    ) -> Result<Value, ClientError>
    where
        T: RecoveryTarget + ?Sized,
    {
        let (settle, settled) = oneshot::channel();
        let entry = {
            let mut state = self.state.lock();
            match state.phase {
                Phase::Refreshing => {
                    state.queue.push_back(Waiter { descriptor, settle });
                    debug!(queued = state.queue.len(), "request parked behind renewal");
                    Entry::Parked
                }
                Phase::Draining => {
                    debug!(path = %descriptor.path, "401 while draining, replaying once");
                    Entry::Replay(descriptor)
                }
                Phase::Idle => {
                    let current = target.current_token();
                    if current.is_some() && current.as_deref() != sent_with {
                        debug!(path = %descriptor.path, "credential already renewed, replaying");
                        Entry::Replay(descriptor)
                    } else if current.is_none() && sent_with.is_some() {
                        // Session was cleared after this request went out.
                        debug!(path = %descriptor.path, "credential already abandoned, rejecting");
                        Entry::Reject
                    } else {
                        state.phase = Phase::Refreshing;
                        state.queue.push_back(Waiter { descriptor, settle });
                        Entry::Lead
                    }
                }
            }
        };

        match entry {
            Entry::Replay(descriptor) => return self.replay_once(target, descriptor).await,
            Entry::Reject => return Err(ClientError::Auth("session expired".to_owned())),
            Entry::Lead => self.run_cycle(target).await,
            Entry::Parked => {}
        }

        match settled.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Auth("renewal abandoned".to_owned())),
        }
    }

    async fn run_cycle<T>(&self, target: &T)
    where
        T: RecoveryTarget + ?Sized,
    {
        let mut guard = CycleGuard { coordinator: self, armed: true };
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        info!(cycle, "credential rejected, renewing");

        let outcome = match tokio::time::timeout(self.timeout, target.renew()).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Auth(format!(
                "renewal timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(()) => {
                let waiters = {
                    let mut state = self.state.lock();
                    state.phase = Phase::Draining;
                    std::mem::take(&mut state.queue)
                };
                let replayed = waiters.len();
                info!(cycle, replayed, "credential renewed, replaying parked requests");

                // join_all polls in order, so replays are initiated FIFO.
                join_all(waiters.into_iter().map(|waiter| async move {
                    let result = self.replay_once(target, waiter.descriptor).await;
                    let _ = waiter.settle.send(result);
                }))
                .await;

                self.state.lock().phase = Phase::Idle;
                guard.armed = false;
                target.renewed(replayed);
            }
            Err(e) => {
                let reason = match e {
                    ClientError::Auth(_) => e,
                    other => ClientError::Auth(other.to_string()),
                };
                let waiters = self.reset();
                guard.armed = false;
                warn!(cycle, err = %reason, rejected = waiters.len(), "credential renewal failed");
                for waiter in waiters {
                    let _ = waiter.settle.send(Err(reason.clone()));
                }
                target.abandon(&reason);
            }
        }
    }

    async fn replay_once<T>(&self, target: &T, descriptor: RequestDescriptor) -> Result<Value, ClientError>
    where
        T: RecoveryTarget + ?Sized,
    {
        let path = descriptor.path.clone();
        match target.replay(descriptor).await {
            Err(e) if e.http_status() == Some(401) => {
                warn!(path = %path, "replay rejected with renewed credential");
                Err(ClientError::Auth("credential rejected after renewal".to_owned()))
            }
            other => other,
        }
    }

    /// Back to `Idle`, handing out whatever is still parked.
    fn reset(&self) -> VecDeque<Waiter> {
        let mut state = self.state.lock();
        state.phase = Phase::Idle;
        std::mem::take(&mut state.queue)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("phase", &state.phase)
            .field("queued", &state.queue.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Fails the cycle if the leader's future is dropped mid-flight.
struct CycleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let waiters = self.coordinator.reset();
        warn!(rejected = waiters.len(), "renewal cycle dropped before completion");
        for waiter in waiters {
            let _ = waiter.settle.send(Err(ClientError::Auth("renewal abandoned".to_owned())));
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
