//  Copyright 2024 coho contributors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! `ThreadGate`: many-reader / one-writer coordinator with lock promotion
//! and reentrancy, modeled on Coherence's `coherence::util::ThreadGate`.
//!
//! The original tracks `{status, enterCount}` as one lock-free atomic word
//! and a thread-local reentrancy counter. We keep the same externally
//! observable state machine and reentrancy discipline, but hold it behind a
//! `parking_lot::Mutex` + `Condvar` rather than a hand-rolled CAS loop: the
//! gate is not a hot per-operation path (callers take it once per bulk
//! operation, not once per key), so the simpler, auditable representation
//! is the better trade here. See `DESIGN.md` for the reasoning.

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use coho_common::error::{Error, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::cancel::CancelToken;

/// The number of entered threads a gate may hold before `enter` starts
/// failing with `IllegalState`, mirroring `ThreadGate::max_enters`.
pub const MAX_ENTERS: u32 = (1 << 30) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Open,
    Closing,
    Closed,
    Destroyed,
}

/// Outcome of a blocking gate operation, returned as a value rather than
/// thrown as an exception (spec Design Notes: "bubble timeouts as values").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Acquired,
    TimedOut,
}

struct Inner {
    status: GateStatus,
    /// Number of distinct threads currently inside the gate. Reentrant
    /// `enter` calls by a thread already inside do not change this.
    enters: u32,
    closing_thread: Option<ThreadId>,
    /// Nested `bar_entry`/`close` calls completed by `closing_thread`.
    close_count: u32,
}

thread_local! {
    static LOCAL_ENTERS: RefCell<HashMap<usize, u32>> = RefCell::new(HashMap::new());
}

enum Wait {
    Notified,
    TimedOut,
}

fn wait_until(
    condvar: &Condvar,
    guard: &mut MutexGuard<'_, Inner>,
    deadline: Option<Instant>,
    cancel: Option<&CancelToken>,
) -> std::result::Result<Wait, Error> {
    if let Some(cancel) = cancel {
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }
    }
    match deadline {
        None => {
            // No deadline: still poll the cancel token periodically rather
            // than blocking forever past a cancellation request.
            if cancel.is_some() {
                let timed_out = condvar.wait_for(guard, Duration::from_millis(50)).timed_out();
                Ok(if timed_out { Wait::TimedOut } else { Wait::Notified })
            } else {
                condvar.wait(guard);
                Ok(Wait::Notified)
            }
        }
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return Ok(Wait::TimedOut);
            }
            let remaining = deadline - now;
            let poll = cancel.map(|_| Duration::from_millis(50).min(remaining)).unwrap_or(remaining);
            let timed_out = condvar.wait_for(guard, poll).timed_out();
            if timed_out && Instant::now() >= deadline {
                Ok(Wait::TimedOut)
            } else {
                Ok(Wait::Notified)
            }
        }
    }
}

/// Many-reader / one-writer gate. See module docs for the concurrency
/// model and `spec.md` §4.1 for the full contract.
pub struct ThreadGate {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl Default for ThreadGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: GateStatus::Open,
                enters: 0,
                closing_thread: None,
                close_count: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    fn id(&self) -> usize {
        self as *const Self as usize
    }

    fn local_count(&self) -> u32 {
        let id = self.id();
        LOCAL_ENTERS.with(|m| *m.borrow().get(&id).unwrap_or(&0))
    }

    fn set_local_count(&self, count: u32) {
        let id = self.id();
        LOCAL_ENTERS.with(|m| {
            if count == 0 {
                m.borrow_mut().remove(&id);
            } else {
                m.borrow_mut().insert(id, count);
            }
        });
    }

    /// Number of threads currently inside the gate.
    pub fn active_count(&self) -> u32 {
        self.inner.lock().enters
    }

    /// Whether the calling thread currently holds an (possibly reentrant)
    /// entry into the gate.
    pub fn is_active_thread(&self) -> bool {
        self.local_count() > 0
    }

    pub fn status(&self) -> GateStatus {
        self.inner.lock().status
    }

    /// Non-blocking variant of [`Self::enter_cancelable`] with no
    /// cancellation source.
    pub fn enter(&self, timeout: Option<Duration>) -> Result<Acquisition> {
        self.enter_cancelable(timeout, None)
    }

    pub fn enter_cancelable(&self, timeout: Option<Duration>, cancel: Option<&CancelToken>) -> Result<Acquisition> {
        let local = self.local_count();
        if local > 0 {
            // Reentrant: this thread is already inside (or is the closer),
            // so it gets back in unconditionally, regardless of status.
            self.set_local_count(local + 1);
            return Ok(Acquisition::Acquired);
        }

        let deadline = timeout.map(|d| Instant::now() + d);
        let me = thread::current().id();
        let mut guard = self.inner.lock();
        loop {
            match guard.status {
                GateStatus::Destroyed => {
                    return Err(Error::illegal_state("ThreadGate has been destroyed"));
                }
                GateStatus::Open => {
                    if guard.enters >= MAX_ENTERS {
                        return Err(Error::illegal_state("ThreadGate: max enters reached"));
                    }
                    guard.enters += 1;
                    drop(guard);
                    self.set_local_count(1);
                    return Ok(Acquisition::Acquired);
                }
                GateStatus::Closing | GateStatus::Closed => {
                    if guard.closing_thread == Some(me) {
                        // The closing thread may always re-enter its own gate.
                        guard.enters += 1;
                        drop(guard);
                        self.set_local_count(1);
                        return Ok(Acquisition::Acquired);
                    }
                    match wait_until(&self.condvar, &mut guard, deadline, cancel)? {
                        Wait::Notified => continue,
                        Wait::TimedOut => return Ok(Acquisition::TimedOut),
                    }
                }
            }
        }
    }

    pub fn exit(&self) -> Result<()> {
        let local = self.local_count();
        if local == 0 {
            return Err(Error::illegal_state("ThreadGate::exit: thread has already exited"));
        }
        if local == 1 {
            self.set_local_count(0);
            let mut guard = self.inner.lock();
            guard.enters -= 1;
            if guard.status == GateStatus::Closing && guard.enters == 0 {
                self.condvar.notify_all();
            }
        } else {
            self.set_local_count(local - 1);
        }
        Ok(())
    }

    pub fn bar_entry(&self, timeout: Option<Duration>) -> Result<Acquisition> {
        self.bar_entry_cancelable(timeout, None)
    }

    pub fn bar_entry_cancelable(&self, timeout: Option<Duration>, cancel: Option<&CancelToken>) -> Result<Acquisition> {
        let me = thread::current().id();
        let mut guard = self.inner.lock();
        if guard.closing_thread == Some(me) {
            guard.close_count += 1;
            return Ok(Acquisition::Acquired);
        }

        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if guard.status == GateStatus::Destroyed {
                return Err(Error::illegal_state("ThreadGate has been destroyed"));
            }
            if guard.closing_thread.is_none() {
                guard.status = GateStatus::Closing;
                guard.closing_thread = Some(me);
                guard.close_count = 1;
                return Ok(Acquisition::Acquired);
            }
            match wait_until(&self.condvar, &mut guard, deadline, cancel)? {
                Wait::Notified => continue,
                Wait::TimedOut => return Ok(Acquisition::TimedOut),
            }
        }
    }

    /// Acquire exclusive access to the gate: waits until no thread (other
    /// than the calling thread's own reentrant presence) is inside, then
    /// transitions to `Closed`.
    pub fn close(&self, timeout: Option<Duration>) -> Result<Acquisition> {
        self.close_cancelable(timeout, None)
    }

    pub fn close_cancelable(&self, timeout: Option<Duration>, cancel: Option<&CancelToken>) -> Result<Acquisition> {
        let me = thread::current().id();
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut guard = self.inner.lock();

        if guard.closing_thread == Some(me) && guard.status == GateStatus::Closed {
            guard.close_count += 1;
            return Ok(Acquisition::Acquired);
        }

        // If this thread currently holds an entry, temporarily exclude it
        // from the enter count so a lone entered thread can promote to a
        // close without deadlocking on its own presence.
        let local = self.local_count();
        let self_excluded = local > 0;
        if self_excluded {
            guard.enters -= 1;
        }
        let mut initiated_closing = false;

        let result = loop {
            if guard.status == GateStatus::Destroyed {
                break Err(Error::illegal_state("ThreadGate has been destroyed"));
            }

            if guard.closing_thread.is_none() {
                guard.status = GateStatus::Closing;
                guard.closing_thread = Some(me);
                guard.close_count = 1;
                initiated_closing = true;
            }

            if guard.closing_thread == Some(me) && guard.enters == 0 {
                guard.status = GateStatus::Closed;
                break Ok(Acquisition::Acquired);
            }

            match wait_until(&self.condvar, &mut guard, deadline, cancel) {
                Ok(Wait::Notified) => continue,
                Ok(Wait::TimedOut) => break Ok(Acquisition::TimedOut),
                Err(e) => break Err(e),
            }
        };

        if self_excluded {
            guard.enters += 1;
        }

        match &result {
            Ok(Acquisition::TimedOut) | Err(_) => {
                // Roll back any transition this call itself initiated;
                // never touch a close another thread is still holding.
                if initiated_closing && guard.status != GateStatus::Closed {
                    guard.status = GateStatus::Open;
                    guard.closing_thread = None;
                    guard.close_count = 0;
                    self.condvar.notify_all();
                }
            }
            Ok(Acquisition::Acquired) => {}
        }

        result
    }

    /// Reopen a gate previously barred/closed by the calling thread.
    pub fn open(&self) -> Result<()> {
        let me = thread::current().id();
        let mut guard = self.inner.lock();
        if guard.closing_thread != Some(me) {
            return Err(Error::illegal_state("ThreadGate::open: gate was not closed by this thread"));
        }
        guard.close_count = guard.close_count.saturating_sub(1);
        if guard.close_count == 0 {
            guard.status = GateStatus::Open;
            guard.closing_thread = None;
            self.condvar.notify_all();
        }
        Ok(())
    }

    /// Permanently close the gate. Only the thread holding `Closed` may
    /// call this.
    pub fn destroy(&self) -> Result<()> {
        let me = thread::current().id();
        let mut guard = self.inner.lock();
        match guard.status {
            GateStatus::Destroyed => Ok(()),
            GateStatus::Closed if guard.closing_thread == Some(me) => {
                guard.status = GateStatus::Destroyed;
                guard.closing_thread = None;
                self.condvar.notify_all();
                Ok(())
            }
            GateStatus::Closed => Err(Error::illegal_state("ThreadGate::destroy: gate was not closed by this thread")),
            _ => Err(Error::illegal_state("ThreadGate::destroy: gate is not closed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn enter_exit_roundtrip() {
        let gate = ThreadGate::new();
        assert_eq!(gate.active_count(), 0);
        gate.enter(None).unwrap();
        assert_eq!(gate.active_count(), 1);
        assert!(gate.is_active_thread());
        gate.exit().unwrap();
        assert_eq!(gate.active_count(), 0);
        assert!(!gate.is_active_thread());
    }

    #[test]
    fn reentrant_enter_does_not_double_count() {
        let gate = ThreadGate::new();
        gate.enter(None).unwrap();
        gate.enter(None).unwrap();
        assert_eq!(gate.active_count(), 1);
        gate.exit().unwrap();
        assert_eq!(gate.active_count(), 1);
        gate.exit().unwrap();
        assert_eq!(gate.active_count(), 0);
    }

    #[test]
    fn exit_without_enter_is_illegal_state() {
        let gate = ThreadGate::new();
        assert!(matches!(gate.exit(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn immediate_timeout_does_not_block() {
        let gate = Arc::new(ThreadGate::new());
        gate.bar_entry(None).unwrap();
        gate.close(None).unwrap();

        let other = gate.clone();
        let start = Instant::now();
        let outcome = std::thread::spawn(move || other.enter(Some(Duration::ZERO)).unwrap())
            .join()
            .unwrap();
        assert_eq!(outcome, Acquisition::TimedOut);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    /// Scenario S4 from spec §8: lock promotion then a waiter unblocked by
    /// `open`.
    #[test]
    fn lock_promotion_then_open_unblocks_waiter() {
        let gate = Arc::new(ThreadGate::new());
        gate.enter(None).unwrap();
        // sole active thread is this one: close promotes immediately.
        assert_eq!(gate.close(Some(Duration::from_millis(50))).unwrap(), Acquisition::Acquired);

        let other = gate.clone();
        let entered = Arc::new(AtomicBool::new(false));
        let entered2 = entered.clone();
        let handle = std::thread::spawn(move || {
            let outcome = other.enter(Some(Duration::from_secs(2))).unwrap();
            entered2.store(outcome == Acquisition::Acquired, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));

        gate.open().unwrap();
        handle.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn close_times_out_while_another_thread_is_inside() {
        let gate = Arc::new(ThreadGate::new());
        let blocker = gate.clone();
        blocker.enter(None).unwrap();

        let outcome = gate.close(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(outcome, Acquisition::TimedOut);
        // the failed close must not have left the gate closing/closed.
        assert_eq!(gate.status(), GateStatus::Open);

        blocker.exit().unwrap();
    }

    #[test]
    fn destroy_requires_closer() {
        let gate = ThreadGate::new();
        assert!(matches!(gate.destroy(), Err(Error::IllegalState(_))));
        gate.close(None).unwrap();
        gate.destroy().unwrap();
        assert_eq!(gate.status(), GateStatus::Destroyed);
        assert!(matches!(gate.enter(Some(Duration::ZERO)), Err(Error::IllegalState(_))));
    }

    #[test]
    fn open_by_non_owner_is_illegal_state() {
        let gate = Arc::new(ThreadGate::new());
        gate.close(None).unwrap();
        let other = gate.clone();
        let result = std::thread::spawn(move || other.open()).join().unwrap();
        assert!(matches!(result, Err(Error::IllegalState(_))));
    }
}
