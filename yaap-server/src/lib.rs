//! # YAAP Server Library
//!
//! This crate implements servers for YAAP, the object oriented debug-access
//! protocol that board management controllers use to expose CPU debug
//! interfaces (JTAG and HDT), relays, I2C and LPC taps over the network.
//!
//! ## Overview
//!
//! A server publishes a tree of named objects. Every object is an instance of
//! a class with a fixed method table. Clients send batches of method calls in
//! a single YAARP message and receive one reply block per executed call.
//! Hardware access is guarded by a device-wide session lock so that only one
//! debugger drives the target at a time.
//!
//! ## Architecture
//!
//! - **[`hal`]**: Traits a board backend implements (JTAG shifting, header
//!   control, HDT triggers, relays, I2C, LPC and system services)
//! - **[`classes`]**: The YAAP classes that wrap those traits and decode
//!   method arguments
//! - **[`registry::Registry`]**: Assigns instance ids and builds the object tree
//! - **[`lock::SessionLock`]**: The session lock state machine
//! - **[`dispatch::Context`]**: Executes one request against the registry
//! - **[`server::Server`]**: Accepts connections and serializes all requests
//!   through one task
//!
//! ## Basic Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use yaap_server::{classes::{Device, JtagClass}, hal::SystemHal, registry::Registry};
//! use yaap_server::server::{Builder, DEFAULT_PORT};
//!
//! let system = SystemHal::new(Arc::new(MyBoard::new()));
//! let mut registry = Registry::new();
//! registry.register_device("device", Device::new(system.clone()));
//! registry.register("jtag", JtagClass::new(my_jtag_hal, 5, 5));
//!
//! let server = Builder::new().build(registry, system);
//! server.listen((Ipv6Addr::UNSPECIFIED, DEFAULT_PORT).into()).await?;
//! ```
//!
//! ## Error Handling
//!
//! Failures of a single call are reported in the error list of the response
//! and stop the remaining calls of that request. Malformed or stalled
//! messages close only the offending connection. [`error::ServerError`]
//! is reserved for conditions that stop the whole server, such as a failed bind.
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics. Enable logging to see:
//! - Client connections and disconnections
//! - Lock transitions and rejected calls
//! - Framing errors and timeouts
//!
//! Configure logging with an implementation like `env_logger`:
//!
//! ```ignore
//! env_logger::init();
//! ```
//!
//! ## Thread Model
//!
//! Connections are read concurrently, but requests are executed one at a time
//! by the server task. Method handlers therefore never race on hardware.
pub mod classes;
pub mod dispatch;
pub mod error;
pub mod hal;
pub mod lock;
pub mod mux;
pub mod registry;
pub mod server;
pub mod shift;
