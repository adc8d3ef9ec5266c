pub mod helpers;
pub mod memory;
pub mod mock_host;
pub mod mock_routing;

pub use helpers::*;
pub use memory::{MemoryConnection, MemoryDialer, MemoryHub, MemoryListener};
pub use mock_host::{MockHost, MockStream};
pub use mock_routing::MockRouting;
