pub mod cli;
pub mod config;
pub mod controller;
pub mod convertor;
pub mod display;
pub mod error;
pub mod history;
pub mod permission;
pub mod picker;
pub mod probe;
pub mod relay;
