//! proxyctl: command-line front end for the proxy core controller
//!
//! Every command goes through [`px_core::ControllerClient`]; this crate only
//! parses arguments and renders results.

pub mod commands;
pub mod output;
