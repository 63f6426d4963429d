use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::StreamExt;
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classify;
use crate::persistence::{self, Db, NewEvent};
use crate::runtime::{ContainerStatus, DynContainerRuntime};

/// One decoded log line, ready for persistence.
///
/// Sensor images emit a mix of structured JSON events and free-form process
/// output on the same stream, so every line is probed and tagged instead of
/// guessed at downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// A JSON object; field defaults follow the Cowrie event shape.
    Structured {
        event_type: String,
        src_ip: String,
        details: String,
    },
    /// Free-form text, classified by the rule table. Lines no rule matches
    /// keep the distinct `raw_output` label so unstructured stream noise
    /// stays separable from deliberately ingested `other` events.
    Raw { event_type: String, details: String },
}

/// Decodes a raw chunk into a line, tolerating invalid UTF-8. Blank lines
/// yield `None`.
pub fn parse_line(raw: &[u8]) -> Option<ParsedLine> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
        && value.is_object()
    {
        let event_type = value
            .get("eventid")
            .and_then(|v| v.as_str())
            .unwrap_or("generic_event")
            .to_string();
        let src_ip = value
            .get("src_ip")
            .and_then(|v| v.as_str())
            .unwrap_or("0.0.0.0")
            .to_string();
        return Some(ParsedLine::Structured {
            event_type,
            src_ip,
            details: trimmed.to_string(),
        });
    }

    Some(ParsedLine::Raw {
        event_type: classify::classify(trimmed).unwrap_or("raw_output").to_string(),
        details: trimmed.to_string(),
    })
}

struct ForwarderHandle {
    generation: u64,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Tracks the forwarder task attached to each honeypot.
///
/// Detaching sends an explicit stop signal and awaits the worker, so deleting
/// a honeypot never leaves an orphaned reader behind. Workers that exit on
/// their own (stream closed, container gone) deregister themselves; the
/// generation tag keeps a stale worker from removing its successor.
#[derive(Clone, Default)]
pub struct ForwarderRegistry {
    inner: Arc<StdMutex<HashMap<i64, ForwarderHandle>>>,
    generation: Arc<AtomicU64>,
}

impl ForwarderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a forwarder for the honeypot, replacing any existing one.
    pub async fn attach(
        &self,
        db: Db,
        runtime: DynContainerRuntime,
        honeypot_id: i64,
        container_id: String,
    ) {
        self.detach(honeypot_id).await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let task = tokio::spawn(run_forwarder(
            db,
            runtime,
            honeypot_id,
            container_id,
            stop_rx,
            self.clone(),
            generation,
        ));

        self.inner
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(
                honeypot_id,
                ForwarderHandle {
                    generation,
                    stop: stop_tx,
                    task,
                },
            );
    }

    /// Stops the honeypot's forwarder and waits for it to finish. Returns
    /// whether a forwarder was attached.
    pub async fn detach(&self, honeypot_id: i64) -> bool {
        let handle = self
            .inner
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(&honeypot_id);

        let Some(handle) = handle else {
            return false;
        };

        let _ = handle.stop.send(true);
        if let Err(err) = handle.task.await {
            warn!(honeypot_id, ?err, "forwarder task panicked");
        }
        true
    }

    pub fn is_attached(&self, honeypot_id: i64) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .contains_key(&honeypot_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|err| err.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_if_current(&self, honeypot_id: i64, generation: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        if inner
            .get(&honeypot_id)
            .is_some_and(|handle| handle.generation == generation)
        {
            inner.remove(&honeypot_id);
        }
    }
}

async fn run_forwarder(
    db: Db,
    runtime: DynContainerRuntime,
    honeypot_id: i64,
    container_id: String,
    mut stop: watch::Receiver<bool>,
    registry: ForwarderRegistry,
    generation: u64,
) {
    let mut stream = match runtime.stream_logs(&container_id).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(honeypot_id, container_id = %container_id, ?err, "failed to attach log stream");
            registry.remove_if_current(honeypot_id, generation);
            return;
        }
    };
    info!(honeypot_id, container_id = %container_id, "log forwarder attached");

    // Chunks from the runtime are not line-aligned; buffer until a newline.
    let mut buf: Vec<u8> = Vec::new();
    let mut stream_ended = false;
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    buf.extend_from_slice(&bytes);
                    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        handle_line(&db, honeypot_id, &line).await;
                    }
                }
                Some(Err(err)) => {
                    warn!(honeypot_id, ?err, "log stream failed");
                    stream_ended = true;
                    break;
                }
                None => {
                    debug!(honeypot_id, "log stream closed");
                    stream_ended = true;
                    break;
                }
            }
        }
    }

    // A detach can land mid-line; that tail is an incomplete write, not an
    // event. Only a stream that ended on its own gets its trailing bytes
    // flushed.
    if stream_ended && !buf.is_empty() {
        handle_line(&db, honeypot_id, &buf).await;
    }

    registry.remove_if_current(honeypot_id, generation);
    info!(honeypot_id, "log forwarder stopped");
}

async fn handle_line(db: &Db, honeypot_id: i64, raw: &[u8]) {
    let Some(parsed) = parse_line(raw) else {
        return;
    };

    if let Err(err) = persist_line(db, honeypot_id, parsed).await {
        counter!("apiary_forwarder_lines_dropped_total").increment(1);
        warn!(honeypot_id, ?err, "failed to persist forwarded log line");
    }
}

async fn persist_line(db: &Db, honeypot_id: i64, parsed: ParsedLine) -> anyhow::Result<()> {
    let (event_type, ip_address, details) = match parsed {
        ParsedLine::Structured {
            event_type,
            src_ip,
            details,
        } => (event_type, src_ip, details),
        ParsedLine::Raw {
            event_type,
            details,
        } => (event_type, "0.0.0.0".to_string(), details),
    };

    let mut tx = db.begin().await?;
    persistence::events::insert_event(
        &mut tx,
        NewEvent {
            honeypot_id,
            ip_address,
            event_type,
            details: Some(details),
        },
    )
    .await?;
    tx.commit().await?;

    counter!("apiary_forwarder_events_total").increment(1);
    Ok(())
}

/// Re-attaches forwarders for persisted honeypots whose containers are still
/// running, and marks records whose containers are gone as inactive. Called
/// once at startup.
pub async fn reattach_forwarders(
    db: &Db,
    runtime: &DynContainerRuntime,
    registry: &ForwarderRegistry,
) -> anyhow::Result<usize> {
    let rows = persistence::honeypots::list_with_containers(db).await?;
    let mut attached = 0;

    for row in rows {
        let Some(container_id) = row.container_id.clone() else {
            continue;
        };

        match runtime.inspect_container(&container_id).await {
            Ok(details) if details.status == ContainerStatus::Running => {
                if row.status != "active" {
                    persistence::honeypots::set_status(db, row.id, "active").await?;
                }
                registry
                    .attach(db.clone(), runtime.clone(), row.id, container_id)
                    .await;
                attached += 1;
            }
            Ok(_) => {
                info!(honeypot_id = row.id, "container no longer running, marking inactive");
                persistence::honeypots::set_status(db, row.id, "inactive").await?;
            }
            Err(err) if err.is_not_found() => {
                info!(honeypot_id = row.id, "container gone, marking inactive");
                persistence::honeypots::set_status(db, row.id, "inactive").await?;
            }
            Err(err) => {
                // Leave the record untouched; a runtime hiccup at boot is not
                // evidence the container is gone.
                warn!(honeypot_id = row.id, ?err, "could not inspect container at startup");
            }
        }
    }

    Ok(attached)
}
