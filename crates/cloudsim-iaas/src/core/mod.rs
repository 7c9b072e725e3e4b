//! Resource model, policies and simulation components.

pub mod allocation_policies;
pub mod allocation_policy;
pub mod binding_policy;
pub mod broker;
pub mod cloudlet;
pub mod cloudlet_scheduler;
pub mod common;
pub mod config;
pub mod datacenter;
pub mod error;
pub mod events;
pub mod host;
pub mod vm;
