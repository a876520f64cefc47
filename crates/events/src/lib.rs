//! Realtime event registry.
//!
//! Deduplicating fan-out of server-pushed events to UI subscribers. One
//! transport listener per event name, at most one delivery of an event instance
//! per registration.

pub mod config;
pub mod frame;
pub mod handle;
pub mod in_memory_transport;
pub mod instance;
pub mod registry;
pub mod subscriber;
pub mod transport;

pub use config::{ConfigError, RegistryConfig};
pub use frame::{FrameError, WireFrame};
pub use handle::SubscriptionHandle;
pub use in_memory_transport::InMemoryTransport;
pub use instance::{Clock, EventInstanceId, InstanceKeyConfig, SystemClock};
pub use registry::{Callback, CallbackError, DispatchReport, EventRegistry};
pub use subscriber::{DependencySet, Subscriber};
pub use transport::{ConnectionState, Listener, Transport, TransportRef};

pub use servewise_core::{EventName, RegistrationId};
