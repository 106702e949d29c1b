//! Scoped access to a live engine.
//!
//! A [`Bridge`] is the only handle through which the engine is reached.
//! It is released exactly once: at the end of [`Bridge::scope`], or on drop
//! (which also covers unwinding).

use crate::engine::Engine;
use crate::engine::EngineError;
use crate::engine::Launcher;
use log::error;
use log::info;
use std::fmt::Display;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use thiserror::Error;

// at most one live engine per process
static LIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("an engine is already running in this process")]
    AlreadyRunning,

    #[error("failed to launch engine {version}: {source}")]
    Launch {
        version: String,
        #[source]
        source: EngineError,
    },

    #[error("requested engine {requested} but {found} started")]
    VersionMismatch { requested: String, found: String },
}

#[derive(Debug, Error)]
#[error("engine shutdown failed: {0}")]
pub struct ShutdownError(#[from] EngineError);

type StartHook = Box<dyn FnOnce(&mut dyn Engine)>;

pub struct BridgeBuilder {
    version: String,
    hooks: Vec<StartHook>,
}

impl BridgeBuilder {
    /// `version` is matched exactly against what the launcher starts.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            hooks: Vec::new(),
        }
    }

    /// Register `hook` to run once the engine is live, before any work.
    pub fn when_started<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut dyn Engine) + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn start(self, launcher: &dyn Launcher) -> Result<Bridge, BridgeError> {
        if LIVE.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::AlreadyRunning);
        }

        info!("Starting engine {}...", self.version);
        let mut engine = match launcher.launch(&self.version) {
            Ok(engine) => engine,
            Err(source) => {
                LIVE.store(false, Ordering::SeqCst);
                return Err(BridgeError::Launch {
                    version: self.version,
                    source,
                });
            }
        };

        if engine.version() != self.version {
            let found = engine.version().to_string();
            if let Err(e) = engine.shutdown() {
                error!("failed to stop mismatched engine {found}: {e}");
            }
            LIVE.store(false, Ordering::SeqCst);
            return Err(BridgeError::VersionMismatch {
                requested: self.version,
                found,
            });
        }

        // from here on a panicking hook still releases through Drop
        let mut bridge = Bridge {
            engine,
            released: false,
        };
        for hook in self.hooks {
            hook(bridge.engine.as_mut());
        }

        info!("Loaded engine version: {}", bridge.engine.version());
        Ok(bridge)
    }
}

pub struct Bridge {
    engine: Box<dyn Engine>,
    released: bool,
}

impl Bridge {
    fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Run `workload` against the engine, then release it.
    ///
    /// A failing workload is logged before the release and returned after
    /// it. A failing release is only logged.
    pub fn scope<T, E, F>(self, workload: F) -> Result<T, E>
    where
        F: FnOnce(&dyn Engine) -> Result<T, E>,
        E: Display,
    {
        let outcome = workload(self.engine());
        if let Err(e) = &outcome {
            error!("There was an error, shutting down engine before raising: {e}");
        }
        if let Err(e) = self.close() {
            error!("{e}");
        }
        outcome
    }

    fn close(mut self) -> Result<(), ShutdownError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), ShutdownError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        info!("Shutting down engine...");
        let result = self.engine.shutdown();
        LIVE.store(false, Ordering::SeqCst);
        result.map_err(ShutdownError::from)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("{e}");
        }
    }
}

#[cfg(test)]
static SERIAL: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Tests that start a bridge must hold this.
#[cfg(test)]
pub(crate) fn serialize() -> std::sync::MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineArray;
    use crate::engine::NativeEngine;
    use crate::engine::SigmaBounds;
    use crate::plane::PixelType;
    use crate::plane::Plane;
    use log::LevelFilter;
    use std::panic::AssertUnwindSafe;
    use std::panic::catch_unwind;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default, Clone)]
    struct Probe {
        shutdowns: Arc<AtomicUsize>,
        loggers: Arc<Mutex<Vec<(String, LevelFilter)>>>,
        version: Option<&'static str>,
        failing_shutdown: bool,
    }

    struct ProbeEngine {
        inner: NativeEngine,
        probe: Probe,
    }

    impl Engine for ProbeEngine {
        fn version(&self) -> &str {
            self.probe.version.unwrap_or(NativeEngine::VERSION)
        }

        fn set_logger_level(&mut self, logger: &str, level: LevelFilter) {
            self.probe
                .loggers
                .lock()
                .unwrap()
                .push((logger.to_string(), level));
            self.inner.set_logger_level(logger, level);
        }

        fn to_array(&self, plane: &Plane) -> Result<EngineArray, EngineError> {
            self.inner.to_array(plane)
        }

        fn from_array(
            &self,
            array: EngineArray,
            pixel_type: PixelType,
        ) -> Result<Plane, EngineError> {
            self.inner.from_array(array, pixel_type)
        }

        fn dog(
            &self,
            input: &EngineArray,
            bounds: &SigmaBounds,
        ) -> Result<EngineArray, EngineError> {
            self.inner.dog(input, bounds)
        }

        fn shutdown(&mut self) -> Result<(), EngineError> {
            self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
            self.inner.shutdown()?;
            if self.probe.failing_shutdown {
                return Err(EngineError::Stopped);
            }
            Ok(())
        }
    }

    impl Launcher for Probe {
        fn launch(&self, _version: &str) -> Result<Box<dyn Engine>, EngineError> {
            Ok(Box::new(ProbeEngine {
                inner: NativeEngine::new(),
                probe: self.clone(),
            }))
        }
    }

    struct BrokenLauncher;

    impl Launcher for BrokenLauncher {
        fn launch(&self, version: &str) -> Result<Box<dyn Engine>, EngineError> {
            Err(EngineError::UnavailableVersion {
                requested: version.to_string(),
                available: "none",
            })
        }
    }

    fn builder() -> BridgeBuilder {
        BridgeBuilder::new(NativeEngine::VERSION)
    }

    impl Probe {
        fn shutdowns(&self) -> usize {
            self.shutdowns.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn successful_scope_releases_once() {
        let _serial = serialize();
        let probe = Probe::default();

        let value = builder()
            .start(&probe)
            .unwrap()
            .scope(|engine| Ok::<_, String>(engine.version().to_string()))
            .unwrap();

        assert_eq!(value, NativeEngine::VERSION);
        assert_eq!(probe.shutdowns(), 1);
        assert!(builder().start(&probe).is_ok());
    }

    #[test]
    fn failing_scope_releases_then_returns_error() {
        let _serial = serialize();
        let probe = Probe::default();

        let outcome = builder()
            .start(&probe)
            .unwrap()
            .scope(|_| Err::<(), _>("second file unreadable".to_string()));

        assert_eq!(outcome.unwrap_err(), "second file unreadable");
        assert_eq!(probe.shutdowns(), 1);
    }

    #[test]
    fn panicking_scope_still_releases() {
        let _serial = serialize();
        let probe = Probe::default();
        let bridge = builder().start(&probe).unwrap();

        let caught = catch_unwind(AssertUnwindSafe(|| {
            bridge.scope(|_| -> Result<(), String> { panic!("engine blew up") })
        }));

        assert!(caught.is_err());
        assert_eq!(probe.shutdowns(), 1);
        assert!(builder().start(&probe).is_ok());
    }

    #[test]
    fn only_one_live_bridge() {
        let _serial = serialize();
        let probe = Probe::default();

        let first = builder().start(&probe).unwrap();
        assert!(matches!(
            builder().start(&probe),
            Err(BridgeError::AlreadyRunning)
        ));

        first.close().unwrap();
        assert_eq!(probe.shutdowns(), 1);
    }

    #[test]
    fn hooks_run_once_engine_is_live() {
        let _serial = serialize();
        let probe = Probe::default();
        let seen = Arc::new(Mutex::new(None));
        let seen_by_hook = seen.clone();

        let bridge = builder()
            .when_started(move |engine| {
                *seen_by_hook.lock().unwrap() = Some(engine.version().to_string());
                engine.set_logger_level("kernel", LevelFilter::Warn);
            })
            .start(&probe)
            .unwrap();

        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some(NativeEngine::VERSION)
        );
        assert_eq!(
            *probe.loggers.lock().unwrap(),
            vec![("kernel".to_string(), LevelFilter::Warn)]
        );
        drop(bridge);
        assert_eq!(probe.shutdowns(), 1);
    }

    #[test]
    fn panicking_hook_still_releases() {
        let _serial = serialize();
        let probe = Probe::default();

        let caught = catch_unwind(AssertUnwindSafe(|| {
            builder()
                .when_started(|_| panic!("hook blew up"))
                .start(&probe)
        }));

        assert!(caught.is_err());
        assert_eq!(probe.shutdowns(), 1);
        assert!(builder().start(&probe).is_ok());
    }

    #[test]
    fn version_mismatch_stops_the_engine() {
        let _serial = serialize();
        let probe = Probe {
            version: Some("2.0.0"),
            ..Probe::default()
        };

        let err = builder().start(&probe).err().unwrap();

        assert!(matches!(err, BridgeError::VersionMismatch { .. }));
        assert_eq!(probe.shutdowns(), 1);
        assert!(builder().start(&Probe::default()).is_ok());
    }

    #[test]
    fn launch_failure_leaves_nothing_running() {
        let _serial = serialize();

        assert!(matches!(
            builder().start(&BrokenLauncher),
            Err(BridgeError::Launch { .. })
        ));
        assert!(builder().start(&Probe::default()).is_ok());
    }

    #[test]
    fn shutdown_error_does_not_mask_workload_error() {
        let _serial = serialize();
        let probe = Probe {
            failing_shutdown: true,
            ..Probe::default()
        };

        let outcome = builder()
            .start(&probe)
            .unwrap()
            .scope(|_| Err::<(), _>("workload failed".to_string()));
        assert_eq!(outcome.unwrap_err(), "workload failed");

        let bridge = builder().start(&probe).unwrap();
        assert!(bridge.close().is_err());
        assert_eq!(probe.shutdowns(), 2);
    }
}
