//! Queue message formats
//!
//! The alert payload consumed from the queue, and the record written to the
//! dead-letter queue for messages that can never be delivered.

pub mod alert;
pub mod dead_letter;

pub use alert::AlertMessage;
pub use dead_letter::DeadLetterRecord;
