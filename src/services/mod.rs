//! Store access and request resolution.

#[cfg(test)]
pub mod memory_store;
pub mod object_store;
pub mod resolver;
pub mod storage_service;
