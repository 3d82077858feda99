pub mod chain;
pub mod config;
pub mod error;
pub mod metadata;
pub mod model;
pub mod record;
pub mod render;
pub mod resolve;
pub mod session;
pub mod store;
pub mod text;
pub mod uri;

pub use chain::{ParseError, ParseStats, ParsedChain, parse_chain};
pub use config::ChainlogRoots;
pub use error::{ChainlogError, Result};
pub use metadata::{extract_metadata, extract_metadata_from_file, extract_metadata_stream};
pub use model::{
    MessageRole, Session, SessionListing, SessionMetadata, StoredMessage, SubagentSession,
};
pub use render::{
    render_listing_markdown, render_session_markdown, render_subagent_list_markdown,
    render_subagent_markdown, to_raw_json,
};
pub use resolve::{ResolvedSession, project_directories, resolve_session_path};
pub use session::{BuiltSessions, LeafFailure, build_sessions, build_subagent_session};
pub use store::{FileSystem, LocalFileSystem, SessionLoad, SessionStore};
pub use uri::SessionUri;
