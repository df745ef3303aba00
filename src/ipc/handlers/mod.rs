pub mod core;
pub mod exchange;
pub mod potential;
pub mod preferences;
