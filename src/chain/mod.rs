//! Chain access for the coordinated Safe account
//!
//! This module provides:
//! - Multi-RPC provider management with automatic failover
//! - Account config resolution from the Safe contract

pub mod provider;
pub mod safe;

pub use provider::ChainProvider;
pub use safe::SafeAccountResolver;
