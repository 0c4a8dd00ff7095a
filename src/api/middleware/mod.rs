//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Identity: validates gateway headers, records the actor
//! 2. Audit logger: logs after identity, has the actor id

pub mod audit;
pub mod identity;
