pub mod bot;
pub mod constants;
pub mod page;
pub mod slots;
