//! Small shared helpers.

pub mod mutex;

pub use mutex::MutexExt;
