pub mod api;
pub mod controls;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod ports;
pub mod sim;

mod precheck;
mod roster;
mod runner;
mod signals;

pub use api::{CallHandler, CallHandlerBuilder};
pub use controls::{About, AllowCalls, Messenger};
pub use errors::CallError;
pub use metrics::{ActionCounters, CounterSnapshot, NoopMetrics};
pub use model::{
    ActionReport, CallState, CallerId, CallerKey, CallerRef, HostEntry, QueuedAction,
};
pub use policy::{CallPolicy, CallTimeouts, ControlSpec};
pub use ports::{ControlRef, Landmark, MetricsPort, StagePort, Surface};
pub use roster::{CallbackId, RosterCallback};
pub use sim::{RowStatus, SimConfig, SimulatedStage};
