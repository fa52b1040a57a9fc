pub mod app;
pub mod authz;
pub mod config;
pub mod db;
pub mod docs;
pub mod errors;
pub mod events;
pub mod jwt;
pub mod models;
pub mod notify;
pub mod routes;
pub mod seed;
pub mod store;
pub mod utils;

pub use app::create_app;
