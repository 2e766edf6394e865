pub mod app;
pub mod baracoda;
pub mod catalog;
pub mod config;
pub mod declarations;
pub mod domain;
pub mod error;
pub mod labwhere;
pub mod output;
pub mod plates;
pub mod reports;
pub mod sequencescape;
pub mod store;
pub mod warehouse;
