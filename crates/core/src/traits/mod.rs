//! Collaborator traits
//!
//! The request pipeline talks to the outside world through three seams:
//!
//! ```text
//!   HistoryStore  : durable conversation log (read by user + cutoff, append once per request)
//!   DocumentStore : uploaded documents addressed by namespace + file name
//!   MessageSink   : per-connection send primitive for outbound status messages
//! ```

mod documents;
mod history;
mod sink;

pub use documents::DocumentStore;
pub use history::{HistoryEntry, HistoryStore};
pub use sink::{MessageSink, RecordingSink};
