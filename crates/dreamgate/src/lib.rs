//! Dreamgate - A streaming gateway that bridges WebSocket and HTTP clients onto
//! an event bus capability service.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod background;
pub mod build_info;
pub mod config;

// ============================================================================
// Server & HTTP
// ============================================================================

pub mod api;
pub mod handlers;
pub mod server;

// ============================================================================
// Domain
// ============================================================================

pub mod bridge;
pub mod capability;
pub mod distiller;
pub mod memory;
pub mod session;
pub mod upstream;

// ============================================================================
// Test Support
// ============================================================================

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
