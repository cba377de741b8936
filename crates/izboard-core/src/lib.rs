#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

//! Board-independent logic of the izBoard e-paper client: boot decisions,
//! persisted configuration, streamed frame decoding, the render fetch
//! pipeline and the setup portal.

extern crate alloc;

pub mod boot;
pub mod config;
pub mod dhcp;
pub mod dns;
pub mod frame;
pub mod http;
pub mod lifecycle;
pub mod pipeline;
pub mod portal;
pub mod record;
pub mod schedule;

#[cfg(test)]
mod test_support;
