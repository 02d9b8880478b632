pub mod caption_track;
pub mod message;
pub mod page_record;
pub mod retry_queue;
pub mod tab_state;
pub mod transcript;
pub mod watch_url;
