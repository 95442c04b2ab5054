//! Wire protocol for the LyttleUtils placeholder bridge
//!
//! A backend server sends [`RequestFrame`]s over the proxy plugin messaging
//! channel and receives [`ResponseFrame`]s carrying the resolved value. This
//! crate only knows about bytes; correlation, caching and timeouts live in
//! `lyttleutils`.

#![warn(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::missing_assert_message,
    clippy::unwrap_in_result,
    clippy::unwrap_used,
    clippy::str_to_string,
    clippy::clone_on_ref_ptr,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::manual_let_else,
    clippy::redundant_closure_for_method_calls,
    clippy::trivially_copy_pass_by_ref
)]
#![allow(clippy::use_self)]

pub mod codec;
pub mod error;
pub mod frame;

pub use uuid;

pub use codec::{BridgeCodec, DEFAULT_MAX_FRAME_SIZE};
pub use error::ProtocolError;
pub use frame::{Frame, RequestFrame, ResponseFrame, CHANNEL_NAME, REQUEST_KIND, RESPONSE_KIND};
