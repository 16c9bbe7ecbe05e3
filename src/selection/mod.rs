pub mod applier;
pub mod ports;
pub mod selector;
pub mod watcher;
