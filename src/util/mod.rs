//! Utility modules: retry, timeout, JSON repair.

pub mod json;
pub mod retry;
pub mod timeout;
