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


//! Wire protocol.
//!
//! Every frame is a 4 byte big-endian length followed by that many bytes. Node to node and
//! client to provider frames carry a [`GeneralPacket`] envelope. A pull is answered by a bare
//! [`Signal`] frame; after `SI` one frame per message follows, then an empty frame. The client
//! confirms with an [`ACK`] frame, and only then are the messages removed.

use crate::{
	core::{CodecError, SphinxPacket},
	provider::{Signal, StoredMessage, Token},
};
use prost::Message;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sphinx packet.
pub const COMM_FLAG: &str = "COMM";
/// Client registration.
pub const ASGN_FLAG: &str = "ASGN";
/// Inbox pull.
pub const PULL_FLAG: &str = "PULL";
/// Registration reply carrying the client token.
pub const TOKN_FLAG: &str = "TOKN";

/// Delivery acknowledgement sent by a client after the last message of a pull.
pub const ACK: &[u8; 2] = b"AK";

#[derive(Clone, PartialEq, Message)]
pub struct GeneralPacket {
	#[prost(string, tag = "1")]
	pub flag: String,
	#[prost(bytes = "vec", tag = "2")]
	pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ClientPubs {
	#[prost(string, tag = "1")]
	pub id: String,
	#[prost(string, tag = "2")]
	pub host: String,
	#[prost(string, tag = "3")]
	pub port: String,
	#[prost(bytes = "vec", tag = "4")]
	pub pub_key: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct PullRequest {
	#[prost(string, tag = "1")]
	pub client_id: String,
	#[prost(bytes = "vec", tag = "2")]
	pub token: Vec<u8>,
}

/// Decoded envelope.
#[derive(Clone, PartialEq)]
pub enum Envelope {
	Comm(SphinxPacket),
	Assign(ClientPubs),
	Pull(PullRequest),
	Token(Token),
}

impl Envelope {
	pub fn encode(&self) -> Vec<u8> {
		let (flag, data) = match self {
			Envelope::Comm(packet) => (COMM_FLAG, packet.to_bytes()),
			Envelope::Assign(pubs) => (ASGN_FLAG, pubs.encode_to_vec()),
			Envelope::Pull(request) => (PULL_FLAG, request.encode_to_vec()),
			Envelope::Token(token) => (TOKN_FLAG, token.to_vec()),
		};
		GeneralPacket { flag: flag.to_owned(), data }.encode_to_vec()
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
		let packet = GeneralPacket::decode(bytes)?;
		let data = packet.data.as_slice();
		Ok(match packet.flag.as_str() {
			COMM_FLAG => Envelope::Comm(SphinxPacket::from_bytes(data)?),
			ASGN_FLAG => Envelope::Assign(ClientPubs::decode(data)?),
			PULL_FLAG => Envelope::Pull(PullRequest::decode(data)?),
			TOKN_FLAG => {
				let token: Token = data.try_into().map_err(|_| CodecError::BadSerialization)?;
				Envelope::Token(token)
			},
			other => return Err(CodecError::UnknownFlag(other.to_owned())),
		})
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Envelope::Comm(_) => COMM_FLAG,
			Envelope::Assign(_) => ASGN_FLAG,
			Envelope::Pull(_) => PULL_FLAG,
			Envelope::Token(_) => TOKN_FLAG,
		}
	}
}

/// Sends a frame.
pub async fn send_frame<S>(stream: &mut S, frame: &[u8]) -> io::Result<()>
where
	S: AsyncWrite + Unpin,
{
	let size = u32::try_from(frame.len())
		.map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Frame too large"))?;
	stream.write_all(&size.to_be_bytes()).await?;
	stream.write_all(frame).await?;
	stream.flush().await
}

/// Waits for an incoming frame. Returns `None` if the peer closed the stream between frames.
pub async fn recv_frame<S>(stream: &mut S, max_size: usize) -> io::Result<Option<Vec<u8>>>
where
	S: AsyncRead + Unpin,
{
	let mut size = [0u8; 4];
	match stream.read_exact(&mut size).await {
		Ok(_) => (),
		Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(e) => return Err(e),
	}
	let size = u32::from_be_bytes(size) as usize;
	if size > max_size {
		return Err(io::Error::new(
			io::ErrorKind::InvalidData,
			format!("Frame of {size} bytes exceeds {max_size}"),
		))
	}
	let mut frame = vec![0u8; size];
	stream.read_exact(&mut frame).await?;
	Ok(Some(frame))
}

/// Like [`recv_frame`] but a closed stream is an error.
pub async fn expect_frame<S>(stream: &mut S, max_size: usize) -> io::Result<Vec<u8>>
where
	S: AsyncRead + Unpin,
{
	recv_frame(stream, max_size)
		.await?
		.ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "Stream closed"))
}

/// Provider side of a pull reply: signal, messages, terminator.
pub async fn send_pull_reply<S>(
	stream: &mut S,
	signal: Signal,
	messages: &[StoredMessage],
) -> io::Result<()>
where
	S: AsyncWrite + Unpin,
{
	send_frame(stream, signal.as_bytes()).await?;
	if signal == Signal::SI {
		for message in messages {
			send_frame(stream, &message.data).await?;
		}
		send_frame(stream, &[]).await?;
	}
	Ok(())
}

/// Client side of a pull reply. Messages are only returned for `SI`.
pub async fn recv_pull_reply<S>(
	stream: &mut S,
	max_size: usize,
) -> io::Result<(Signal, Vec<Vec<u8>>)>
where
	S: AsyncRead + Unpin,
{
	let frame = expect_frame(stream, max_size).await?;
	let signal = Signal::from_bytes(&frame)
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Unknown fetch signal"))?;
	let mut messages = Vec::new();
	if signal == Signal::SI {
		loop {
			let frame = expect_frame(stream, max_size).await?;
			if frame.is_empty() {
				break
			}
			messages.push(frame);
		}
	}
	Ok((signal, messages))
}

/// Token bytes from a `TOKN` reply.
pub fn token_from_envelope(envelope: Envelope) -> Result<Token, CodecError> {
	match envelope {
		Envelope::Token(token) => Ok(token),
		other => Err(CodecError::UnknownFlag(other.kind().to_owned())),
	}
}
