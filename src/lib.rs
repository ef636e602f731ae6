#![cfg_attr(not(test), no_std)]

pub mod broker;
pub mod config;
pub mod constants;
pub mod decode;
pub mod display;
pub mod geo;
pub mod gps;
pub mod link;
pub mod metrics;
pub mod mqtt;
pub mod nmea;
pub mod node;
pub mod payload;
pub mod probe;
pub mod readings;
pub mod record;
pub mod retry;
pub mod topic;

#[cfg(test)]
mod testing;
