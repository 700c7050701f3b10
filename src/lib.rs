//! Device-identity reset engine.
//!
//! Regenerates the four per-installation telemetry identifiers an
//! application keeps in its JSON config store and, where the platform has
//! one, the OS identity store (Windows registry `MachineGuid`, Linux
//! `/etc/machine-id`). Old installs are handled by patching the
//! application's main script instead; macOS delegates to a trusted script.
//!
//! The public API is organised into these layers:
//!
//! - **[`config`]**: settings file and CLI overrides
//! - **[`platform`]**: OS detection, privilege probing, per-OS paths and strategy
//! - **[`resources`]**: backup, apply and verify primitives for each mutated artifact
//! - **[`reset`]**: the version gate and the state machine sequencing a run
//! - **[`commands`]**: top-level subcommands (`reset`, `generate`, `version`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod platform;
pub mod reset;
pub mod resources;
