pub mod sessions;
pub mod start;
