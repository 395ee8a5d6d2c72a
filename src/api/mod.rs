//! Asset shim API
//!
//! Entry points used by the server binary and embedding applications.

pub mod server_api;
