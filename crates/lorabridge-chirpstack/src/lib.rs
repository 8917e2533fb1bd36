//! ChirpStack REST API client.
//!
//! Talks to the network server's HTTP gateway with a bearer API key.
//! Each call maps 1:1 to one ChirpStack endpoint; the relay treats
//! failures as opaque.

mod client;

pub use client::{ChirpstackClient, ChirpstackConfig};
