// Core modules for the minidb key-value server
pub mod storage; // Store: the in-memory key-value map
pub mod snapshot; // Snapshot load/save to the flat text file
pub mod protocol; // Line framing, tokenizer, Verb/Request/Reply
pub mod dispatch; // Dispatcher::exec (command execution logic)
pub mod conn; // Connection registry backed by a slab
pub mod shutdown; // Cancellation handle that wakes the poller
pub mod config; // Config: address, snapshot path, limits
pub mod net; // bind_listener + Server (event loop)

// Re-export all public items from modules for easier access
pub use storage::*;
pub use snapshot::*;
pub use protocol::*;
pub use dispatch::*;
pub use conn::*;
pub use shutdown::*;
pub use config::*;
pub use net::*;
