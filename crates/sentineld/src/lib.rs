//! Daemon-side components for the detection/recovery engine: the raw
//! file-system watcher bridge, the event dispatcher, the recovery
//! orchestrator, process-wide counters, the status socket, and the
//! optional periodic reconciliation sweep. Split out as a library so
//! integration tests can exercise these pieces directly, the way
//! `guard-service`'s own subsystems are exercised from `tests/`.

pub mod counters;
pub mod dispatcher;
pub mod orchestrator;
pub mod reconcile;
pub mod status;
pub mod watcher;
