// Node layer: the per-process coordination context.

pub mod context;

pub use context::NodeContext;
