//! This module defines how to parse binary block and transaction data.

pub mod block;
pub mod error;
pub mod json;
pub mod pack;
pub mod reader;
pub mod script;
pub mod transaction;
