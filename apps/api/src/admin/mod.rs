//! Operator surface: runtime settings, usage dashboards and health probes.

pub mod handlers;
