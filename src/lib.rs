//! zuk-bridge: command-execution facade over an opaque command engine
//!
//! The engine takes a command string plus optional input streams and answers
//! with a result envelope whose data payloads are base64 with byte-offset
//! highlights. This crate turns that envelope into application-ready data.
//!
//! # Core Concepts
//!
//! - **Facade**: [`EngineFacade`], the one entry point; serializes every call
//!   into the backend and initializes the engine on first use
//! - **Backends**: [`Backend`] implementations that reach the engine in the
//!   same process or over line-delimited JSON-RPC
//! - **Normalization**: decodes data payloads to text or bytes and remaps
//!   highlights from byte offsets to character offsets
//! - **Suggestion context**: streams held by the engine between calls to
//!   inform suggestions
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use zuk_bridge::{EngineFacade, MockBackend};
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let facade = EngineFacade::new(Arc::new(MockBackend::new()));
//!     let result = facade.exec("", Vec::new()).await.unwrap();
//!     assert!(result.is_no_command());
//! });
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod facade;
pub mod normalize;
pub mod output;

pub use backend::{
    Backend, BackendError, Call, Engine, EngineSession, InProcessBackend, MockBackend,
    RpcBackend, SubprocessConfig,
};
pub use config::{BridgeConfig, ConfigError, EngineConfig};
pub use context::{Context, ContextProvider, FixedContext, SystemContext};
pub use facade::{EngineFacade, FacadeError, FacadeResult, DEFAULT_SUGGESTION_AMOUNT};
pub use normalize::{remap_highlights, BoundaryPolicy, Normalizer};
pub use output::{
    Block, CommandResult, Comment, Data, DisplaySuggestion, Highlight, HighlightKind,
    Highlighter, Metadata, NormalizedResult, Output, OutputMode, Payload, RawResult, Spoiler,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
