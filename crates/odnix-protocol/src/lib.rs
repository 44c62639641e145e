//! # Odnix Protocol
//!
//! The secure real-time transport used for call signalling and chat:
//! - Unauthenticated Diffie-Hellman handshake over JSON text records
//! - SHA-256 message key schedule
//! - AES-256-IGE encrypted wire frames with random inner padding
//! - Length-prefixed channel framing and TL service messages
//!
//! ## Protocol Overview
//!
//! ```text
//! Client                                 Server
//!   |                                      |
//!   |------- req_dh_params --------------->|
//!   |<------ res_dh_params ----------------|
//!   |------- set_client_dh_params -------->|
//!   |<------ dh_gen_ok --------------------|
//!   |                                      |
//!   |===== AuthKey on both sides ==========|
//!   |                                      |
//!   |<------- Wire frames ---------------->|
//!   |   auth_key_id | msg_key | IGE data   |
//! ```
//!
//! The compute layers do no I/O. [`channel`] offers async framing helpers
//! for stream transports.

pub mod channel;
pub mod constants;
pub mod errors;
pub mod handshake;
#[cfg(feature = "insecure-nonce-handshake")]
pub mod legacy;
pub mod packet;
pub mod session;
pub mod tl;

pub use channel::*;
pub use constants::*;
pub use errors::*;
pub use handshake::*;
pub use packet::*;
pub use session::*;
pub use tl::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::channel::*;
    pub use crate::constants::*;
    pub use crate::errors::*;
    pub use crate::handshake::*;
    pub use crate::packet::*;
    pub use crate::session::*;
    pub use crate::tl::*;
}
