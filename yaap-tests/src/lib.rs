//! Helpers for running a YAAP server on a loopback socket with stub hardware.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use yaap_protocol::Code;
use yaap_server::{
    classes::{Device, JtagClass, RelayClass, SystemClass},
    error::ServerError,
    hal::{
        HalResult, Jtag, JtagHal, LockChange, Relay, RelayHal, ShiftOp, System, SystemHal,
        TapState, system::DeviceReset,
    },
    registry::Registry,
    server::{self, Builder, Shutdown},
};

/// Records every lock hook and device reset the server invokes.
#[derive(Default)]
pub struct RecordingSystem {
    changes: Mutex<Vec<LockChange>>,
    mux: Mutex<Vec<bool>>,
    resets: AtomicUsize,
}

impl RecordingSystem {
    pub fn changes(&self) -> Vec<LockChange> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mux(&self) -> Vec<bool> {
        self.mux.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl DeviceReset for RecordingSystem {
    fn reset(&self) -> HalResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl System for RecordingSystem {
    fn device_name(&self) -> HalResult<String> {
        Ok("yaap-tests".to_owned())
    }

    fn yaap_key(&self) -> HalResult<[u8; 16]> {
        Err(Code::NOT_IMPLEMENTED)
    }

    fn lock_changed(&self, change: LockChange) -> HalResult<()> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(change);
        Ok(())
    }

    fn config_mux(&self, enable: bool) -> HalResult<()> {
        self.mux
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(enable);
        Ok(())
    }
}

/// TDO mirrors TDI.
pub struct LoopbackJtag;

impl Jtag for LoopbackJtag {
    fn shift(
        &self,
        _op: ShiftOp,
        tdi: &[u8],
        tdo: &mut [u8],
        _bits: u32,
        _pre_tck: u32,
        _post_tck: u32,
        _end_state: TapState,
    ) -> HalResult<()> {
        let len = tdi.len().min(tdo.len());
        tdo[..len].copy_from_slice(&tdi[..len]);
        Ok(())
    }

    fn reset_tap(&self) -> HalResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct StubRelay {
    closed: Mutex<bool>,
}

impl Relay for StubRelay {
    fn set(&self, closed: bool) -> HalResult<()> {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = closed;
        Ok(())
    }

    fn get(&self) -> HalResult<bool> {
        Ok(*self.closed.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// A server with `device`, `system`, `jtag` and `relay0` serving on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub system: Arc<RecordingSystem>,
    pub handle: JoinHandle<Result<Shutdown, ServerError>>,
}

impl TestServer {
    pub async fn start(builder: Builder) -> Result<TestServer, ServerError> {
        TestServer::launch(builder, false).await
    }

    /// Like [TestServer::start], but `system.deviceReset` succeeds.
    pub async fn resettable(builder: Builder) -> Result<TestServer, ServerError> {
        TestServer::launch(builder, true).await
    }

    async fn launch(builder: Builder, reset: bool) -> Result<TestServer, ServerError> {
        let system = Arc::new(RecordingSystem::default());
        let mut hal = SystemHal::new(system.clone());
        if reset {
            hal = hal.with_reset(system.clone());
        }

        let mut registry = Registry::new();
        registry.register_device("device", Device::new(hal.clone()));
        registry.register("system", SystemClass::new(hal.clone()));
        registry.register("jtag", JtagClass::new(JtagHal::new(Arc::new(LoopbackJtag)), 5, 5));
        registry.register("relay0", RelayClass::new(RelayHal::new(Arc::new(StubRelay::default()))));

        let listener = server::bind(SocketAddr::from(([127, 0, 0, 1], 0)))?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(builder.build(registry, hal).serve(listener));
        Ok(TestServer {
            addr,
            system,
            handle,
        })
    }

    pub async fn with_defaults() -> Result<TestServer, ServerError> {
        TestServer::start(Builder::new()).await
    }

    /// Wait until the server task observed `changes.len() >= count` lock hooks.
    pub async fn wait_for_changes(&self, count: usize, limit: Duration) -> Vec<LockChange> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let changes = self.system.changes();
            if changes.len() >= count || tokio::time::Instant::now() >= deadline {
                return changes;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
