pub mod lifecycle;
pub mod qr;
pub mod service;
pub mod sidecar;
pub mod supervisor;

pub use lifecycle::LifecycleAdapter;
pub use service::BridgeService;
pub use sidecar::{SidecarConfig, SidecarProvider};
pub use supervisor::{BackoffPolicy, ReconnectSupervisor};
