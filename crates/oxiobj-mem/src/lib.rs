//! Memory infrastructure for the `oxiobj` runtime.
//!
//! Class runtime records and composed dispatch tables are allocated once and
//! live for the rest of the process. [`arena::GlobalArena`] gives them stable
//! addresses and lock-free allocation from concurrently initializing classes.

pub mod arena;

pub use arena::{ArenaStats, GlobalArena, global_arena};
