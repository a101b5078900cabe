//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table.

mod agents;     // agents (cached registry entries)
mod sync_state; // sync_state (per-network sync bookkeeping)
