pub mod engine;
pub mod memory;
mod reaper;

pub use engine::{EngineConfig, EngineEvent, EngineFactory, EventReceiver, EventSender, GossipEngine};
pub use memory::{MemoryEngine, MemoryNetwork};
