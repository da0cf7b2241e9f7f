// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The profiling session with a type-state lifecycle.
//!
//! ```text
//! ProfilingSession<Idle>
//!     │  .start()        init profilers, install layout, spawn control thread
//!     ▼
//! ProfilingSession<Running>
//!     │  .stop()         stop timer, join thread, flush, deinit profilers
//!     ▼
//!   ProfileReport
//! ```
//!
//! Allocator hooks (`on_arena_created`, `on_extent_created`, ...) are
//! available in both states, so arenas that exist before profiling starts
//! are tracked from interval zero.
//!
//! # Control Thread
//! The control thread runs a current-thread tokio runtime. A periodic timer
//! and a oneshot stop signal are multiplexed with a biased `select!`, so a
//! stop request is seen before the next tick but never interrupts an
//! interval already in progress.

use crate::scheduler::IntervalScheduler;
use crate::{ProfilingOptions, RuntimeError, SchedulerMetrics};
use arena_registry::{ArenaProfile, ArenaRegistry, IntervalSnapshot, SiteId};
use sample_profilers::Profiler;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tiering_engine::{DeviceLayer, OnlineTiering, RebindOutcome, TieringStats};
use tokio::sync::oneshot;

// ── Type-state markers ─────────────────────────────────────────

/// Session is configured but not yet sampling.
#[derive(Debug)]
pub struct Idle;

/// The control thread is running intervals.
#[derive(Debug)]
pub struct Running;

/// Sealed trait for session states.
pub trait SessionState: std::fmt::Debug {}
impl SessionState for Idle {}
impl SessionState for Running {}

// ── Report ─────────────────────────────────────────────────────

/// Everything a session recorded, returned by [`ProfilingSession::stop`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProfileReport {
    pub intervals: u64,
    pub snapshots: Vec<IntervalSnapshot>,
    /// Final state of every arena, with full history.
    pub arenas: Vec<ArenaProfile>,
    pub metrics: SchedulerMetrics,
    pub tiering: Option<TieringStats>,
    /// Moves made by `flush_on_stop`.
    pub flush: Option<RebindOutcome>,
}

impl ProfileReport {
    pub fn summary(&self) -> String {
        format!(
            "{} arenas over {} intervals; {}",
            self.arenas.len(),
            self.intervals,
            self.metrics.summary()
        )
    }
}

// ── Control thread ─────────────────────────────────────────────

struct ControlThread {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<IntervalScheduler>>,
}

impl ControlThread {
    fn spawn(mut scheduler: IntervalScheduler) -> Result<Self, RuntimeError> {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| RuntimeError::ControlThread(format!("cannot build runtime: {e}")))?;

        let handle = std::thread::Builder::new()
            .name("tierprof-control".into())
            .spawn(move || {
                runtime.block_on(async {
                    let period = scheduler.period();
                    let mut ticker =
                        tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                    loop {
                        tokio::select! {
                            biased;
                            _ = &mut stop_rx => break,
                            tick = ticker.tick() => {
                                scheduler.on_tick(tick.into_std());
                            }
                        }
                    }
                });
                tracing::debug!("control thread exiting");
                scheduler
            })
            .map_err(|e| RuntimeError::ControlThread(format!("cannot spawn: {e}")))?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signals the thread and waits for it, returning the scheduler.
    fn join(&mut self) -> Result<IntervalScheduler, RuntimeError> {
        if let Some(stop) = self.stop.take() {
            // The receiver is gone only if the thread already exited.
            let _ = stop.send(());
        }
        let handle = self
            .handle
            .take()
            .ok_or_else(|| RuntimeError::ControlThread("already joined".into()))?;
        handle
            .join()
            .map_err(|_| RuntimeError::ControlThread("control thread panicked".into()))
    }
}

impl Drop for ControlThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            match self.join() {
                Ok(scheduler) => {
                    let (mut profilers, _, _) = scheduler.into_parts();
                    for p in &mut profilers {
                        p.deinit();
                    }
                }
                Err(e) => tracing::warn!("{e}"),
            }
        }
    }
}

// ── Session ────────────────────────────────────────────────────

/// One profiling run over a process's arenas.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use tier_runtime::{ProfilingOptions, ProfilingSession};
/// use tiering_engine::SimulatedDevices;
///
/// let devices = Arc::new(SimulatedDevices::two_tier(1 << 30, 1 << 34));
/// let session = ProfilingSession::new(ProfilingOptions::default(), devices).unwrap();
/// let arena = session.create_arena(1).unwrap();
/// session.on_arena_resized(arena, 4096).unwrap();
///
/// let running = session.start().unwrap();
/// let report = running.stop().unwrap();
/// assert_eq!(report.arenas.len(), 1);
/// ```
pub struct ProfilingSession<S: SessionState = Idle> {
    options: ProfilingOptions,
    registry: Arc<ArenaRegistry>,
    layer: Arc<dyn DeviceLayer>,
    profilers: Vec<Box<dyn Profiler>>,
    control: Option<ControlThread>,
    _state: PhantomData<S>,
}

impl<S: SessionState> std::fmt::Debug for ProfilingSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingSession")
            .field("period", &self.options.period())
            .field("profilers", &self.profilers.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("running", &self.control.is_some())
            .finish()
    }
}

// ── Allocator hooks (any state) ────────────────────────────────

impl<S: SessionState> ProfilingSession<S> {
    pub fn options(&self) -> &ProfilingOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<ArenaRegistry> {
        &self.registry
    }

    /// Creates an arena at the lowest free index.
    pub fn create_arena(&self, site: SiteId) -> Result<usize, RuntimeError> {
        let index = self.registry.create_arena(site)?;
        tracing::debug!("arena {index} created for site {site}");
        Ok(index)
    }

    /// Records an arena the allocator created at `index`.
    pub fn on_arena_created(&self, index: usize, site: SiteId) -> Result<(), RuntimeError> {
        self.registry.insert_arena(index, site)?;
        tracing::debug!("arena {index} created for site {site}");
        Ok(())
    }

    pub fn on_site_added(&self, index: usize, site: SiteId) -> Result<(), RuntimeError> {
        Ok(self.registry.add_site(index, site)?)
    }

    /// Publishes an arena's live size to the profilers and the device layer.
    pub fn on_arena_resized(&self, index: usize, bytes: u64) -> Result<(), RuntimeError> {
        self.registry.resize_arena(index, bytes)?;
        self.layer.arena_resized(index, bytes);
        Ok(())
    }

    pub fn on_extent_created(&self, arena: usize, start: usize, end: usize) -> Result<(), RuntimeError> {
        Ok(self.registry.register_extent(arena, start, end)?)
    }

    /// Removing an extent that was never registered succeeds.
    pub fn on_extent_removed(&self, start: usize) -> Result<(), RuntimeError> {
        Ok(self.registry.unregister_extent(start)?)
    }

    /// Intervals completed so far.
    pub fn intervals_completed(&self) -> u64 {
        self.registry
            .read_profiles()
            .map(|t| t.intervals_completed())
            .unwrap_or(0)
    }

    /// Copies of the interval snapshots recorded so far, oldest first.
    pub fn snapshots(&self) -> Result<Vec<IntervalSnapshot>, RuntimeError> {
        Ok(self.registry.read_profiles()?.snapshots().cloned().collect())
    }
}

// ── Idle → Running ─────────────────────────────────────────────

impl ProfilingSession<Idle> {
    /// Validates `options` and builds the enabled profilers.
    pub fn new(options: ProfilingOptions, layer: Arc<dyn DeviceLayer>) -> Result<Self, RuntimeError> {
        options.validate()?;
        let profilers = options.build_profilers()?;
        let registry = Arc::new(ArenaRegistry::new(options.limits)?);
        tracing::info!(
            "profiling session created: period {:?}, {} profilers",
            options.period(),
            profilers.len()
        );
        Ok(Self {
            options,
            registry,
            layer,
            profilers,
            control: None,
            _state: PhantomData,
        })
    }

    /// Replaces the profilers built from the options.
    pub fn with_profilers(mut self, profilers: Vec<Box<dyn Profiler>>) -> Self {
        self.profilers = profilers;
        self
    }

    /// Initialises profilers and starts the control thread.
    ///
    /// Profilers are initialised on the calling thread, which matters for
    /// perf events that follow the calling thread only.
    pub fn start(mut self) -> Result<ProfilingSession<Running>, RuntimeError> {
        let tiering = match &self.options.tiering {
            Some(config) => Some(OnlineTiering::new(config.clone(), Arc::clone(&self.layer))?),
            None => None,
        };

        let mut profilers = std::mem::take(&mut self.profilers);
        self.registry.install_layout(|arena| {
            for p in &profilers {
                p.on_arena_created(arena);
            }
        })?;

        for i in 0..profilers.len() {
            if let Err(e) = profilers[i].init() {
                for p in &mut profilers[..i] {
                    p.deinit();
                }
                return Err(e.into());
            }
        }

        let names: Vec<&str> = profilers.iter().map(|p| p.name()).collect();
        tracing::info!("profiling started with [{}]", names.join(", "));

        let scheduler = IntervalScheduler::new(
            &self.options,
            Arc::clone(&self.registry),
            profilers,
            tiering,
            Instant::now(),
        );
        let control = ControlThread::spawn(scheduler)?;

        Ok(ProfilingSession {
            options: self.options,
            registry: self.registry,
            layer: self.layer,
            profilers: Vec::new(),
            control: Some(control),
            _state: PhantomData,
        })
    }
}

// ── Running → report ───────────────────────────────────────────

impl ProfilingSession<Running> {
    /// Stops the timer, waits for the control thread and tears down.
    ///
    /// An interval in progress completes before the thread exits. When
    /// `flush_on_stop` is set every arena is demoted before profilers are
    /// released.
    pub fn stop(mut self) -> Result<ProfileReport, RuntimeError> {
        let mut control = self
            .control
            .take()
            .ok_or_else(|| RuntimeError::ControlThread("session is not running".into()))?;
        let mut scheduler = control.join()?;

        let flush = match &self.options.tiering {
            Some(t) if t.flush_on_stop => scheduler.flush()?,
            _ => None,
        };

        let (mut profilers, tiering, metrics) = scheduler.into_parts();
        for p in &mut profilers {
            p.deinit();
        }

        let mut table = self.registry.lock_profiles()?;
        let report = ProfileReport {
            intervals: table.intervals_completed(),
            snapshots: table.take_snapshots(),
            arenas: table.iter().cloned().collect(),
            metrics,
            tiering: tiering.map(|t| t.stats()),
            flush,
        };
        drop(table);

        tracing::info!("profiling stopped: {}", report.summary());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sample_profilers::{ProfilerError, ProfilerKind, SampleContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tiering_engine::SimulatedDevices;

    fn devices() -> Arc<dyn DeviceLayer> {
        Arc::new(SimulatedDevices::two_tier(1 << 20, 1 << 30))
    }

    fn fast_options() -> ProfilingOptions {
        ProfilingOptions {
            period_ns: 2_000_000,
            ..Default::default()
        }
    }

    struct Failing {
        deinits: Arc<AtomicUsize>,
        fail: bool,
        kind: ProfilerKind,
    }

    impl Profiler for Failing {
        fn kind(&self) -> ProfilerKind {
            self.kind
        }
        fn init(&mut self) -> Result<(), ProfilerError> {
            if self.fail {
                Err(ProfilerError::NotAvailable("test".into()))
            } else {
                Ok(())
            }
        }
        fn deinit(&mut self) {
            self.deinits.fetch_add(1, Ordering::SeqCst);
        }
        fn run(&mut self, _ctx: &mut SampleContext<'_>) -> Result<(), ProfilerError> {
            Ok(())
        }
        fn on_interval(&self, _arena: &mut ArenaProfile) {}
        fn on_skip_interval(&self, _arena: &mut ArenaProfile) {}
        fn on_arena_created(&self, _arena: &mut ArenaProfile) {}
    }

    #[test]
    fn test_start_and_stop_records_intervals() {
        let session = ProfilingSession::new(fast_options(), devices()).unwrap();
        let arena = session.create_arena(3).unwrap();
        session.on_arena_resized(arena, 8192).unwrap();
        let running = session.start().unwrap();

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        while running.intervals_completed() < 3 && Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let report = running.stop().unwrap();

        assert!(report.intervals >= 3);
        assert_eq!(report.snapshots.len() as u64, report.intervals);
        let profile = &report.arenas[0];
        assert!(profile.history_consistent(report.intervals));
        assert_eq!(profile.alloc_size.as_ref().unwrap().last(), Some(8192));
    }

    #[test]
    fn test_failed_init_releases_earlier_profilers() {
        let deinits = Arc::new(AtomicUsize::new(0));
        let profilers: Vec<Box<dyn Profiler>> = vec![
            Box::new(Failing {
                deinits: Arc::clone(&deinits),
                fail: false,
                kind: ProfilerKind::ExtentSize,
            }),
            Box::new(Failing {
                deinits: Arc::clone(&deinits),
                fail: true,
                kind: ProfilerKind::AllocSize,
            }),
        ];
        let session = ProfilingSession::new(fast_options(), devices())
            .unwrap()
            .with_profilers(profilers);
        let err = session.start().unwrap_err();
        assert!(matches!(err, RuntimeError::Profiler(ProfilerError::NotAvailable(_))));
        assert_eq!(deinits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_running_session_deinits() {
        let deinits = Arc::new(AtomicUsize::new(0));
        let profilers: Vec<Box<dyn Profiler>> = vec![Box::new(Failing {
            deinits: Arc::clone(&deinits),
            fail: false,
            kind: ProfilerKind::AllocSize,
        })];
        let running = ProfilingSession::new(fast_options(), devices())
            .unwrap()
            .with_profilers(profilers)
            .start()
            .unwrap();
        drop(running);
        assert_eq!(deinits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hooks_validate_input() {
        let session = ProfilingSession::new(fast_options(), devices()).unwrap();
        assert!(session.on_site_added(7, 1).unwrap_err().is_fatal());
        let arena = session.create_arena(1).unwrap();
        session.on_site_added(arena, 2).unwrap();
        assert!(!session.on_extent_created(arena, 0x2000, 0x1000).unwrap_err().is_fatal());
        session.on_extent_removed(0xdead_0000).unwrap();
    }
}
