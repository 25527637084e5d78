// Node runtime
pub mod node;
pub mod process;
pub mod service_config;
pub mod transport;

// App state (configuration, paths)
pub mod state;

pub use node::{Node, NodeError, LOCAL_CHANNEL};
pub use process::{start_node, ShutdownHandle};
pub use service_config::Config as ServiceConfig;
pub use state::{AppConfig, AppState, StateError};
pub use transport::{MemoryHub, MemoryTransport, Received, Transport, TransportError};
