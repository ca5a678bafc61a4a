//! HTTP Transport layer for the Model Context Protocol
//!
//! Provides the external API routing, including the streamable `/mcp` endpoint and metadata endpoints.

pub mod handlers;
pub mod session_header;
