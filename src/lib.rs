pub mod ai;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gmail;
pub mod models;
pub mod routes;
pub mod secretbox;
pub mod services;
