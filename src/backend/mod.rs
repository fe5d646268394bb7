//! Engine bindings
//!
//! Every binding implements [`Backend`]. The in-process and JSON-RPC
//! bindings share engine-side state through [`EngineSession`].

mod in_process;
mod mock;
pub mod rpc;
mod session;
mod traits;

pub use in_process::InProcessBackend;
pub use mock::{Call, MockBackend};
pub use rpc::{RpcBackend, SubprocessConfig};
pub use session::{Engine, EngineSession};
pub use traits::{Backend, BackendError};
