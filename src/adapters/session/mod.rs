//! Session registry adapters.

mod in_memory_registry;
mod sweeper;

pub use in_memory_registry::InMemorySessionRegistry;
pub use sweeper::spawn_session_sweeper;
