//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod fakes;
pub mod media;
#[cfg(unix)]
pub mod remuxer;
pub mod socket_guard;
