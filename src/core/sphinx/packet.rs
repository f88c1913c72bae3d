// Copyright 2022 Parity Technologies (UK) Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Sphinx packet format.
//!
//! Packets consist of the following:
//!
//! - [`Header`]:
//!   - Key-exchange group element (alpha in the Sphinx paper), uncompressed SEC1.
//!   - Routing information (beta), [`BETA_SIZE`] bytes at every hop.
//!   - [`Mac`](super::crypto::Mac) over beta (gamma).
//! - Payload (delta), same length at every hop.
//!
//! Beta starts with a length-delimited [`RoutingInfo`] encrypted under the hop key. The routing
//! info of a relaying hop embeds the next hop's encrypted routing info and MAC; the remainder of
//! beta is filler derived from the previous hop's shared secret.
//!
//! All structures use protobuf encoding with fixed field numbers.

use crate::core::error::CodecError;
use prost::Message;

/// Maximum number of hops a packet can traverse.
pub const MAX_HOPS: usize = 5;

/// Size in bytes of beta on the wire, identical at every hop.
///
/// Beta holds the nested routing info of all remaining hops followed by filler, so the ids and
/// addresses of a path have to fit in it: each hop adds its next hop's id, address and 57 byte
/// key, a 32 byte MAC and a few bytes of framing. Five hops with ids and addresses of around 66
/// characters each exceed it, and building such a packet fails with
/// [`CodecError::HeaderTooLarge`].
pub const BETA_SIZE: usize = 1024;

#[derive(Clone, PartialEq, Message)]
pub struct Header {
	#[prost(bytes = "vec", tag = "1")]
	pub alpha: Vec<u8>,
	#[prost(bytes = "vec", tag = "2")]
	pub beta: Vec<u8>,
	#[prost(bytes = "vec", tag = "3")]
	pub mac: Vec<u8>,
}

/// Routing target as seen by the previous hop.
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct Hop {
	#[prost(string, tag = "1")]
	pub id: String,
	/// `host:port`.
	#[prost(string, tag = "2")]
	pub address: String,
	/// Empty for the final destination.
	#[prost(bytes = "vec", tag = "3")]
	pub pub_key: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Commands {
	/// Seconds to hold the packet before forwarding.
	#[prost(double, tag = "1")]
	pub delay: f64,
	#[prost(string, tag = "2")]
	pub flag: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RoutingInfo {
	#[prost(message, optional, tag = "1")]
	pub next_hop: Option<Hop>,
	#[prost(message, optional, tag = "2")]
	pub commands: Option<Commands>,
	#[prost(bytes = "vec", tag = "3")]
	pub next_hop_meta_data: Vec<u8>,
	#[prost(bytes = "vec", tag = "4")]
	pub mac: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SphinxPacket {
	#[prost(message, optional, tag = "1")]
	pub hdr: Option<Header>,
	#[prost(bytes = "vec", tag = "2")]
	pub pld: Vec<u8>,
}

impl SphinxPacket {
	pub fn to_bytes(&self) -> Vec<u8> {
		self.encode_to_vec()
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
		Ok(Self::decode(bytes)?)
	}

	pub fn header(&self) -> Result<&Header, CodecError> {
		self.hdr.as_ref().ok_or(CodecError::MissingField("hdr"))
	}
}

/// Per-hop routing flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flag {
	/// Forward to the next hop.
	Relay,
	/// Deliver to the inbox named by the next hop id.
	LastHop,
}

impl Flag {
	/// Wire text of the flag: the flag byte (`0xF1` relay, `0xF0` last hop) in upper-case hex.
	pub fn as_str(self) -> &'static str {
		match self {
			Flag::Relay => "F1",
			Flag::LastHop => "F0",
		}
	}

	pub fn parse(flag: &str) -> Result<Self, CodecError> {
		match flag {
			"F1" => Ok(Flag::Relay),
			"F0" => Ok(Flag::LastHop),
			other => Err(CodecError::UnknownFlag(other.to_owned())),
		}
	}
}

impl Commands {
	pub fn new(delay: f64, flag: Flag) -> Self {
		Commands { delay, flag: flag.as_str().to_owned() }
	}

	pub fn flag(&self) -> Result<Flag, CodecError> {
		Flag::parse(&self.flag)
	}
}
