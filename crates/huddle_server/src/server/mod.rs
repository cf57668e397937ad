#![forbid(unsafe_code)]

pub mod auth;
pub mod broadcast;
pub mod chat;
pub mod connection;
pub mod credentials;
pub mod db;
pub mod http;
pub mod persist;
pub mod rate_limit;
pub mod registry;
pub mod relay;
pub mod room_hub;
pub mod room_store;
pub mod state;

#[cfg(test)]
mod auth_tests;

#[cfg(test)]
mod broadcast_tests;


#[cfg(test)]
mod persist_tests;

#[cfg(test)]
mod rate_limit_tests;

#[cfg(test)]
mod room_hub_tests;
