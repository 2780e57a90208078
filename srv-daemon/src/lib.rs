//! srv daemon: keeps site containers attached to the shared proxy network.
//!
//! The runtime owns two tasks joined by a bounded queue: a reader that
//! decodes the container runtime's event stream and a handler that resolves
//! each started container to a site and attaches it. Both observe one
//! [`Shutdown`] signal.

pub mod binder;
mod error;
pub mod events;
pub mod launchd;
pub mod log_rotation;
pub mod mapping;
pub mod paths;
mod runtime;
pub mod service;
pub mod shutdown;
pub mod systemd;
pub mod watcher;

pub use binder::{AttachOutcome, NetworkBinder};
pub use error::DaemonError;
pub use events::RuntimeEvent;
pub use launchd::{generate_plist, LaunchdAgent};
pub use mapping::MappingCache;
pub use runtime::{ensure_runtime_installed, init_tracing, run, start_blocking};
pub use service::{current_executable, detect_service_manager, ServiceKind, ServiceManager, ServiceStatus};
pub use shutdown::Shutdown;
pub use systemd::{generate_unit, SystemdUserService};
pub use watcher::{
    Backoff, DockerEventSource, EventSource, StreamEnd, Subscription, Watcher, WatcherSettings,
};
