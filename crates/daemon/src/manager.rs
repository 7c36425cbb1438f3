// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic poll-loop driver shared by all four daemons (`SPEC_FULL.md` §9):
//! Global Manager, Personal Manager, Orchestrator, and Task Worker differ
//! only in their `poll`/`claim`/`process` bodies and in daemon-specific
//! idle-time side work injected via `on_idle`. `run_poll_loop` owns claim-
//! race handling, backoff, and the outermost catch-log-sleep-continue
//! contract (`spec.md` §7).

use async_trait::async_trait;
use mesh_core::{CoordinationError, ETag};
use std::time::{Duration, Instant};

/// Gates idle-time side work (stale-row sweeps, periodic checks) behind its
/// own interval so it doesn't run on every poll tick. Shared by the
/// Personal Manager's Running/Outbound sweeps; `self_update::SelfUpdateTimer`
/// is the same shape, kept separate since it also owns the repo path.
pub struct IntervalGate {
    interval: Duration,
    last_run: Instant,
}

impl IntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_run: Instant::now() - interval }
    }

    pub fn is_due(&self) -> bool {
        self.last_run.elapsed() >= self.interval
    }

    pub fn mark_ran(&mut self) {
        self.last_run = Instant::now();
    }
}

/// A row fetched from the directory store paired with the ETag it was read
/// with, so a later claim PATCH can supply `If-Match`. Row types keep
/// `etag` as a `#[serde(skip)]` field rather than carrying it themselves
/// (`mesh-wire`'s `get_rows` returns it out-of-band), so every manager needs
/// this pairing.
pub struct ClaimableRow<T> {
    pub row: T,
    pub etag: Option<ETag>,
}

#[async_trait]
pub trait Manager: Send {
    type Item: Send;

    /// Finds the next unit of work, if any. `Ok(None)` means nothing to do
    /// this iteration, not an error.
    async fn poll(&mut self) -> Result<Option<Self::Item>, CoordinationError>;

    /// Attempts to take ownership of `item` (an ETag-guarded PATCH or
    /// equivalent). `Ok(false)` means another daemon won the race — the
    /// expected, non-error `ConcurrencyConflict` outcome (`spec.md` §7), not
    /// something to retry within this iteration.
    async fn claim(&mut self, item: &Self::Item) -> Result<bool, CoordinationError>;

    /// Executes the claimed item to completion.
    async fn process(&mut self, item: Self::Item) -> Result<(), CoordinationError>;

    /// Daemon-specific idle-time side work: self-update checks, queue
    /// promotion, stale-row sweeps. Runs once per iteration regardless of
    /// whether `poll` found anything; each implementor gates its own work
    /// behind its own interval so a 10-minute self-update check doesn't run
    /// on every poll tick.
    async fn on_idle(&mut self) -> Result<(), CoordinationError> {
        Ok(())
    }

    /// Runs once, on SIGINT, before the loop returns. The Task Worker uses
    /// this to fail its in-progress task; the other daemons have nothing to
    /// do here.
    async fn on_shutdown(&mut self) -> Result<(), CoordinationError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub poll_interval: Duration,
    /// Multiplier applied to `poll_interval` after an iteration that
    /// returned an error (`spec.md` §7: "sleep for 2 × POLL_INTERVAL").
    pub backoff_multiplier: u32,
}

impl PollConfig {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval, backoff_multiplier: 2 }
    }
}

/// Why `run_poll_loop` returned.
#[derive(Debug)]
pub enum LoopExit {
    Fatal(CoordinationError),
    SigInt,
}

async fn run_iteration<M: Manager>(manager: &mut M) -> Result<(), CoordinationError> {
    if let Some(item) = manager.poll().await? {
        if manager.claim(&item).await? {
            manager.process(item).await?;
        } else {
            tracing::debug!("lost claim race for polled item, will retry next poll");
        }
    }
    manager.on_idle().await
}

/// Drives `manager` until a fatal error or SIGINT. Every non-fatal error is
/// logged and the loop backs off and continues — the "catch every
/// exception, log it, sleep, and continue" contract every daemon's
/// outermost loop must implement. The only non-catchable events are an
/// intentional self-update exit (which calls `std::process::exit` directly
/// from inside `on_idle` and so never returns here) and SIGINT.
pub async fn run_poll_loop<M: Manager>(mut manager: M, config: &PollConfig) -> LoopExit {
    loop {
        tokio::select! {
            result = run_iteration(&mut manager) => {
                match result {
                    Ok(()) => tokio::time::sleep(config.poll_interval).await,
                    Err(e) if e.is_fatal() => return LoopExit::Fatal(e),
                    Err(e) => {
                        if e.is_error_level() {
                            tracing::warn!(error = %e, "poll iteration failed, backing off");
                        } else {
                            tracing::debug!(error = %e, "poll iteration reported an expected conflict");
                        }
                        tokio::time::sleep(config.poll_interval * config.backoff_multiplier).await;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if let Err(e) = manager.on_shutdown().await {
                    tracing::warn!(error = %e, "on_shutdown hook failed");
                }
                return LoopExit::SigInt;
            }
        }
    }
}
