//! # ESP8266 serial manager
//!
//! Serial command channel and WIFI connection manager for ESP8266 modules running AT firmware.
//!
//! The crate is `no_std`, allocation free and built for cooperative main loops: all work happens
//! inside [SerialManager::poll](manager::SerialManager::poll), which needs to be called
//! repeatedly. The UART is accessed via [embedded_io] traits, time is taken from a
//! [fugit_timer::Timer].
//!
//! Layers, leaves first:
//! * [framer]: Reassembles the received byte stream to line frames
//! * [channel]: Sends commands and matches their replies, one command at a time
//! * [wifi]: Connection state machine (join, status polling, reconnect)
//! * [manager]: Facade combining the layers above
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

#[cfg(test)]
extern crate alloc;

#[macro_use]
mod fmt;

pub mod channel;
pub mod commands;
pub mod config;
pub mod error;
pub mod framer;
pub mod manager;
pub mod notification;
pub mod responses;
pub mod wifi;

#[cfg(feature = "examples")]
pub mod example;

#[cfg(test)]
mod tests;
