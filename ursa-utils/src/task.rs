//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use derive_new::new;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio::{task, time};
use tracing::{Instrument, error};

/// A handle which can be used to manipulate the task created by the
/// [`Task::spawn`] function.
///
/// By default, dropping this handle cancels the task (unless [`Task::detach`]
/// is used).
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
    detached: bool,
}

/// A handle which can be used to manipulate the timeout task created by the
/// [`TimeoutTask::new`] function.
///
/// Dropping this handle cancels the timeout task.
#[derive(Debug)]
pub struct TimeoutTask {
    #[cfg(not(feature = "testing"))]
    inner: TimeoutTaskInner,
}

#[derive(Debug, new)]
struct TimeoutTaskInner {
    _task: Task<()>,
    control: UnboundedSender<Message>,
}

/// A handle which can be used to manipulate the interval task created by the
/// [`IntervalTask::new`] function.
///
/// Dropping this handle cancels the interval task.
#[derive(Debug)]
pub struct IntervalTask {
    #[cfg(not(feature = "testing"))]
    inner: IntervalTaskInner,
}

#[derive(Debug, new)]
struct IntervalTaskInner {
    _task: Task<()>,
    control: UnboundedSender<Message>,
}

#[derive(Debug)]
enum Message {
    Reset(Option<Duration>),
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
            detached: false,
        }
    }

    /// Detach the task, meaning it will no longer be canceled if its handle is
    /// dropped.
    pub fn detach(&mut self) {
        self.detached = true;
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, task::JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.join_handle.abort();
        }
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Spawns a new task that will call the provided async closure when the
    /// specified timeout expires.
    ///
    /// Returns a handle that can be used to manipulate the timeout task.
    #[cfg(not(feature = "testing"))]
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let task = Task::spawn(
            async move {
                let timeout_fut = time::sleep(timeout);
                tokio::pin!(timeout_fut);

                loop {
                    tokio::select! {
                        // Timeout has expired.
                        _ = &mut timeout_fut => {
                            (cb)().await;
                            break;
                        }
                        message = control_rx.recv() => {
                            match message {
                                // Timeout has been refreshed/updated.
                                Some(Message::Reset(None)) => {
                                    let next = Instant::now() + timeout;
                                    timeout_fut.as_mut().reset(next);
                                },
                                Some(Message::Reset(Some(new_timeout))) => {
                                    let next = Instant::now() + new_timeout;
                                    timeout_fut.as_mut().reset(next);
                                },
                                // Timeout has been aborted.
                                None => break,
                            }
                        }
                    }
                }
            }
            .in_current_span(),
        );

        TimeoutTask {
            inner: TimeoutTaskInner::new(task, control_tx),
        }
    }

    /// Resets the timeout, regardless if it has already expired or not.
    ///
    /// If a new timeout value isn't specified, the last value will be reused.
    pub fn reset(&mut self, timeout: Option<Duration>) {
        #[cfg(not(feature = "testing"))]
        {
            if self.inner.control.send(Message::Reset(timeout)).is_err() {
                error!("failed to reset timeout");
            }
        }
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Spawns a new task that will call the provided async closure whenever
    /// the specified interval timer ticks.
    ///
    /// Returns a handle that can be used to manipulate the interval task.
    #[cfg(not(feature = "testing"))]
    pub fn new<F, Fut>(
        interval: Duration,
        tick_on_start: bool,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let task = Task::spawn(
            async move {
                let mut interval_fut = if tick_on_start {
                    time::interval(interval)
                } else {
                    let start = Instant::now() + interval;
                    time::interval_at(start, interval)
                };

                loop {
                    tokio::select! {
                        // Interval timer has ticked.
                        _ = interval_fut.tick() => {
                            (cb)().await;
                        }
                        message = control_rx.recv() => {
                            match message {
                                // Interval timer has been updated.
                                Some(Message::Reset(None)) => {
                                    interval_fut = time::interval(interval);
                                },
                                Some(Message::Reset(Some(new_interval))) => {
                                    interval_fut = time::interval(new_interval);
                                },
                                // Interval timer has been aborted.
                                None => break,
                            }
                        }
                    }
                }
            }
            .in_current_span(),
        );

        IntervalTask {
            inner: IntervalTaskInner::new(task, control_tx),
        }
    }

    /// Resets the interval.
    ///
    /// If a new interval value isn't specified, the last value will be reused.
    pub fn reset(&mut self, interval: Option<Duration>) {
        #[cfg(not(feature = "testing"))]
        {
            if self.inner.control.send(Message::Reset(interval)).is_err() {
                error!("failed to reset interval");
            }
        }
    }
}
