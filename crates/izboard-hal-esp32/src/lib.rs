#![no_std]

//! ESP32 adapters behind the `izboard-core` seams.

pub mod network;

pub mod platform {
    pub mod display;
}

pub mod storage {
    pub mod flash_config;
}
