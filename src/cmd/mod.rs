pub mod cases;
pub mod config;
