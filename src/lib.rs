// adsprobe - Native Rust ADS client for Beckhoff TwinCAT PLCs.
// Copyright 2025 - adsprobe contributors

#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub mod index;
pub mod netid;
pub mod probe;
pub mod types;

pub use client::{
    AdsClient, AdsError, AmsHeader,
    ADS_TCP_PORT, ADS_PORT_SYSTEM, ADS_PORT_TC2_PLC1, ADS_PORT_TC3_PLC1,
};
pub use config::{ConfigError, ProbeConfig};
pub use netid::{AmsAddr, AmsNetId};
pub use probe::ProbeReport;
pub use types::{AdsState, AdsVersion, DeviceInfo};
