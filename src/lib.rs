pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod frame;
pub mod output;
pub mod pokeapi;
pub mod schema;
pub mod store;
pub mod warehouse;
