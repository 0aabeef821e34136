//! Implementation of the [CoAP protocol][spec] core: a bit-exact wire
//! codec and a reliable datagram transmission engine.
//!
//! Features:
//! - CoAP core protocol [RFC 7252](https://tools.ietf.org/rfc/rfc7252.txt):
//!   header, schema-driven delta-encoded options, payload
//! - Reliable transmission of Confirmable messages with the RFC 7252 §4.8
//!   exponential backoff parameters
//! - Pluggable datagram transport; UDP provided, DTLS pluggable through the
//!   same [`PacketEndpoint`] seam
//!
//! # Example
//!
//! ```no_run
//! use coap_core::{Connection, CoapRequest, RequestType, MessageIdSource, RandTokenSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Connection::bind("0.0.0.0:0").await?;
//!     let ids = MessageIdSource::new(0);
//!     let tokens = RandTokenSource::new(4);
//!
//!     let mut request = CoapRequest::new(RequestType::Get);
//!     request.message_id = ids.next_id();
//!     request.token = tokens.token();
//!     request.path = "/sensors/temperature".to_string();
//!
//!     let packet = coap_core::Packet::from_bytes(
//!         &request.to_bytes()?,
//!         &coap_core::DecodeOptions::default(),
//!     )?;
//!     conn.write(&packet, "198.51.100.1:5683".parse()?).await?;
//!
//!     let (response, peer) = conn.read().await?;
//!     println!("{} answered with {}", peer, response.header.code);
//!
//!     Ok(())
//! }
//! ```
//!
//! [spec]: https://datatracker.ietf.org/doc/html/rfc7252

pub mod connection;
pub mod error;
pub mod message;
pub mod retransmit;
pub mod transport;

pub use crate::connection::{Connection, ConnectionOptions, Reader, Writer};
pub use crate::error::{ConnectionError, MessageError};
pub use crate::message::header::{
    token_hash, Header, MessageClass, MessageIdSource, MessageType, RandTokenSource, RequestType,
    ResponseType, PROTOCOL_VERSION, TOKEN_MAX_LENGTH,
};
pub use crate::message::option::{CoapOption, OptionValue};
pub use crate::message::options::Options;
pub use crate::message::packet::{DecodeOptions, Packet, PAYLOAD_MARKER};
pub use crate::message::request::CoapRequest;
pub use crate::message::response::CoapResponse;
pub use crate::message::schema::{default_schema, MediaType, OptionDef, Schema, ValueFormat};
pub use crate::retransmit::{
    RetransmitErrorHandler, RetransmitOptions, RetransmitQueue, TransmitEntry, ACK_RANDOM_FACTOR,
    ACK_TIMEOUT, MAX_RETRANSMIT, MAX_TRANSMIT_SPAN, MAX_TRANSMIT_WAIT,
};
pub use crate::transport::PacketEndpoint;
