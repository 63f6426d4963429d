use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::{LimitsConfig, ProvisionConfig};
use crate::forwarder::ForwarderRegistry;
use crate::persistence;
use crate::runtime::DynContainerRuntime;
use crate::sidelog::RawLogSink;

/// Shared application state passed into handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: persistence::Db,
    pub runtime: DynContainerRuntime,
    pub forwarders: ForwarderRegistry,
    /// Fallback sink for event payloads the database refuses.
    pub raw_log: Arc<dyn RawLogSink>,
    pub limits: LimitsConfig,
    pub provision: ProvisionConfig,
    pub metrics_handle: PrometheusHandle,
}

#[allow(dead_code)]
fn _assert_app_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}
