//! # Unit Tests
//!
//! One module per source module of the core library.



/// Enumerator, buffer initializer, and the exerciser tests.
pub mod exerciser;


/// Result words, outcomes, and the status table.
pub mod status;
