//! Steam-trap downlink configurator
//!
//! Derives LoRaWAN configuration downlinks for steam-trap sensors from their
//! physical parameters and queues them on the gateways' device-queue API.

pub mod aggregator;
pub mod categories;
pub mod config;
pub mod encoder;
pub mod gateway;
pub mod generator;
pub mod logging;
pub mod matcher;
pub mod plan;
pub mod pt_table;
pub mod tables;
pub mod transmitter;
