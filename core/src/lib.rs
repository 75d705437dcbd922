pub mod ai;
pub mod catalog;
pub mod db;
pub mod error;
pub mod models;
pub mod nutrition;
pub mod prompt;
pub mod service;
