//! Core types for stride.

pub mod event;
pub mod file;
pub mod message;
pub mod plan;
pub mod tool_result;

pub use event::*;
pub use file::*;
pub use message::*;
pub use plan::*;
pub use tool_result::*;
