pub mod inflight;
pub mod parser;
pub mod schema;
pub mod walk;

pub use inflight::{InflightMap, DEFAULT_MAX_ENTRIES};
pub use parser::{parse_file, parse_file_with_cap, ParseSummary};
pub use walk::walk_conversations;
