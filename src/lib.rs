pub mod batch;
pub mod cli;
pub mod config;
pub mod detect;
pub mod driver;
pub mod error;
pub mod extract;
pub mod navigate;
pub mod report;
pub mod upload;
pub mod util;
