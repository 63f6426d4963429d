//! Shared fakes for unit and integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::app_state::AppState;
use crate::config::{LimitsConfig, ProvisionConfig};
use crate::forwarder::ForwarderRegistry;
use crate::persistence::honeypots::{insert_honeypot, NewHoneypot};
use crate::persistence::{migrations, Db};
use crate::runtime::{
    ContainerDetails, ContainerRuntime, ContainerRuntimeError, ContainerSpec, ContainerStatus,
    LogStream,
};
use crate::sidelog::MemoryRawLogSink;

pub type LogItem = Result<Bytes, ContainerRuntimeError>;

struct MockContainer {
    details: ContainerDetails,
    host_port: Option<u16>,
    log_tx: Option<mpsc::UnboundedSender<LogItem>>,
    log_rx: Option<mpsc::UnboundedReceiver<LogItem>>,
}

impl MockContainer {
    fn new(id: &str, name: &str, host_port: Option<u16>) -> Self {
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        Self {
            details: ContainerDetails {
                id: id.to_string(),
                name: Some(name.to_string()),
                status: ContainerStatus::Running,
            },
            host_port,
            log_tx: Some(log_tx),
            log_rx: Some(log_rx),
        }
    }
}

/// In-memory [`ContainerRuntime`] double with scriptable failures and a
/// per-container channel for injecting log stream chunks.
#[derive(Default)]
pub struct MockRuntime {
    containers: StdMutex<HashMap<String, MockContainer>>,
    start_errors: StdMutex<VecDeque<ContainerRuntimeError>>,
    fail_removes: AtomicBool,
    suppress_host_ports: AtomicBool,
    start_counter: AtomicUsize,
    started: StdMutex<Vec<ContainerSpec>>,
    stopped: StdMutex<Vec<String>>,
    removed: StdMutex<Vec<String>>,
}

impl MockRuntime {
    pub fn add_running_container(&self, id: &str, name: &str, host_port: Option<u16>) {
        self.containers
            .lock()
            .expect("lock")
            .insert(id.to_string(), MockContainer::new(id, name, host_port));
    }

    /// Takes the sender feeding the container's log stream. The test owns it
    /// from then on; dropping it ends the stream.
    pub fn log_sender(&self, id: &str) -> Option<mpsc::UnboundedSender<LogItem>> {
        self.containers
            .lock()
            .expect("lock")
            .get_mut(id)
            .and_then(|container| container.log_tx.take())
    }

    pub fn queue_start_error(&self, err: ContainerRuntimeError) {
        self.start_errors.lock().expect("lock").push_back(err);
    }

    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// When set, `resolve_host_port` reports no binding regardless of the
    /// container's configured port.
    pub fn set_suppress_host_ports(&self, suppress: bool) {
        self.suppress_host_ports.store(suppress, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<ContainerSpec> {
        self.started.lock().expect("lock").clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().expect("lock").clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn pull_image(&self, _image: &str) -> Result<(), ContainerRuntimeError> {
        Ok(())
    }

    async fn start_container(&self, spec: ContainerSpec) -> Result<String, ContainerRuntimeError> {
        self.started.lock().expect("lock").push(spec.clone());
        if let Some(err) = self.start_errors.lock().expect("lock").pop_front() {
            return Err(err);
        }

        let seq = self.start_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("mock-{seq}");
        let host_port = spec
            .port
            .host_port
            .or(Some(49000 + u16::try_from(seq).unwrap_or(0)));
        self.containers.lock().expect("lock").insert(
            id.clone(),
            MockContainer::new(&id, &spec.name, host_port),
        );
        Ok(id)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, ContainerRuntimeError> {
        self.containers
            .lock()
            .expect("lock")
            .get(id)
            .map(|container| container.details.clone())
            .ok_or(ContainerRuntimeError::NotFound { id: id.to_string() })
    }

    async fn resolve_host_port(
        &self,
        id: &str,
        _container_port: u16,
    ) -> Result<Option<u16>, ContainerRuntimeError> {
        if self.suppress_host_ports.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.containers
            .lock()
            .expect("lock")
            .get(id)
            .map(|container| container.host_port)
            .ok_or(ContainerRuntimeError::NotFound { id: id.to_string() })
    }

    async fn stop_container(
        &self,
        id: &str,
        _timeout_secs: u32,
    ) -> Result<(), ContainerRuntimeError> {
        self.stopped.lock().expect("lock").push(id.to_string());
        let mut guard = self.containers.lock().expect("lock");
        match guard.get_mut(id) {
            Some(container) => {
                container.details.status = ContainerStatus::Exited { exit_code: Some(0) };
                Ok(())
            }
            None => Err(ContainerRuntimeError::NotFound { id: id.to_string() }),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), ContainerRuntimeError> {
        self.removed.lock().expect("lock").push(id.to_string());
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(ContainerRuntimeError::RemoveContainer {
                id: id.to_string(),
                source: anyhow::anyhow!("simulated removal failure"),
            });
        }

        if self.containers.lock().expect("lock").remove(id).is_some() {
            Ok(())
        } else {
            Err(ContainerRuntimeError::NotFound { id: id.to_string() })
        }
    }

    async fn stream_logs(&self, id: &str) -> Result<LogStream, ContainerRuntimeError> {
        let mut guard = self.containers.lock().expect("lock");
        let Some(container) = guard.get_mut(id) else {
            return Err(ContainerRuntimeError::NotFound { id: id.to_string() });
        };
        let Some(rx) = container.log_rx.take() else {
            return Err(ContainerRuntimeError::Logs {
                id: id.to_string(),
                source: anyhow::anyhow!("log stream already consumed"),
            });
        };

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}

/// Fully wired [`AppState`] over a fresh in-memory database, with handles to
/// the doubles behind it.
pub struct TestState {
    pub state: AppState,
    pub runtime: Arc<MockRuntime>,
    pub raw_log: MemoryRawLogSink,
}

pub async fn test_state() -> TestState {
    let db = migrations::init_pool("sqlite::memory:").await.expect("pool");
    migrations::run_migrations(&db).await.expect("migrations");

    let runtime = Arc::new(MockRuntime::default());
    let raw_log = MemoryRawLogSink::default();
    let state = AppState {
        db,
        runtime: runtime.clone(),
        forwarders: ForwarderRegistry::new(),
        raw_log: Arc::new(raw_log.clone()),
        limits: LimitsConfig::default(),
        provision: ProvisionConfig {
            port_poll_attempts: 3,
            port_poll_interval_ms: 10,
            stop_timeout_secs: 1,
        },
        metrics_handle: crate::metrics::init_metrics_recorder(),
    };

    TestState {
        state,
        runtime,
        raw_log,
    }
}

/// Inserts a detached honeypot row and returns its id.
pub async fn seed_honeypot(db: &Db) -> i64 {
    let mut tx = db.begin().await.expect("begin");
    let id = insert_honeypot(
        &mut tx,
        NewHoneypot {
            name: "seeded".to_string(),
            kind: "ssh".to_string(),
            host: "0.0.0.0".to_string(),
            port: 2222,
            status: "active".to_string(),
            container_id: None,
            container_name: None,
        },
    )
    .await
    .expect("insert honeypot");
    tx.commit().await.expect("commit");
    id
}
