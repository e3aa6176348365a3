pub mod catalog;
pub mod db;
pub mod error;
pub mod models;
pub mod plan;
pub mod service;
pub mod session;
pub mod store;
pub mod units;
