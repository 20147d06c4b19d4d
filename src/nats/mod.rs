//! NATS messaging layer
//!
//! Carries real-time events to the transport edge when more than one engine
//! instance serves the same audience.

pub mod client;

pub use client::NatsClient;
