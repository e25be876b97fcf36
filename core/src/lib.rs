#![warn(
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented
)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::struct_field_names
)]

pub mod cluster;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod instrumentation;
pub mod manifests;
pub mod net;
pub mod reconcile;
