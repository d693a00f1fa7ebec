//! Describes gallery photos and albums with a local vision model and
//! suggests albums for unsorted photos.

pub mod app;
pub mod config;
pub mod describe;
pub mod images;
pub mod llm;
pub mod logging;
pub mod models;
pub mod repository;
pub mod server;
pub mod suggest;
pub mod tasks;

#[cfg(test)]
mod test_support;
