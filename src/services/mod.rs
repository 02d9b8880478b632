pub mod delivery_queue;
pub mod orchestrator;
pub mod page_extractor;
pub mod storage;
pub mod transcript_client;

pub use delivery_queue::*;
pub use orchestrator::*;
pub use page_extractor::*;
pub use storage::*;
pub use transcript_client::*;
