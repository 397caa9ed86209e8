pub mod config;
pub mod duplicators;
pub mod providers;
