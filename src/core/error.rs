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

//! Error types.
//!
//! Crypto and codec errors are packet scoped: they are logged and the packet is dropped. Config
//! errors surface to the caller building a packet. Persistence and IO errors are scoped to the
//! operation that hit them.

use std::io;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
	/// Point encoding is not a valid uncompressed P-224 point.
	#[error("Invalid curve point encoding")]
	BadPoint,
	/// Key has the wrong length or maps to an unusable scalar.
	#[error("Invalid key")]
	BadKey,
	/// Header MAC does not verify under this hop's key.
	#[error("MAC mismatch")]
	MacMismatch,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
	#[error("Malformed serialized structure")]
	BadSerialization,
	#[error("Payload is empty")]
	PayloadTooShort,
	#[error("Unknown routing flag {0:?}")]
	UnknownFlag(String),
	#[error("Missing field `{0}`")]
	MissingField(&'static str),
	/// Routing information does not fit in the fixed size beta.
	#[error("Routing information of {size} bytes exceeds {max} bytes")]
	HeaderTooLarge { size: usize, max: usize },
}

impl From<prost::DecodeError> for CodecError {
	fn from(_: prost::DecodeError) -> Self {
		CodecError::BadSerialization
	}
}

/// Failure building or processing a single Sphinx packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
	#[error(transparent)]
	Crypto(#[from] CryptoError),
	#[error(transparent)]
	Codec(#[from] CodecError),
	/// Path has no hops or more than the packet format supports.
	#[error("Unsupported number of hops: {0}")]
	HopCount(usize),
	/// Number of per-hop commands does not match the number of hops.
	#[error("Expected {expected} hop commands, got {got}")]
	CommandCount { expected: usize, got: usize },
	/// Hop commands must relay at every hop but the last, which delivers.
	#[error("Unexpected routing flag at hop {hop}")]
	FlagSequence { hop: usize },
	/// Packet already processed by this node.
	#[error("Replayed packet")]
	Replayed,
}

impl PacketError {
	pub fn is_mac_mismatch(&self) -> bool {
		matches!(self, PacketError::Crypto(CryptoError::MacMismatch))
	}
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
	/// Exponential rate must be strictly positive.
	#[error("Invalid rate {0}, must be positive")]
	BadRate(f64),
	#[error("No mix available")]
	EmptyMixSet,
	#[error("Cannot sample {requested} elements out of {available}")]
	SampleLargerThanPopulation { requested: usize, available: usize },
	/// End to end path length outside `3..=MAX_HOPS`.
	#[error("Invalid path length {0}")]
	PathLength(usize),
	#[error("Unknown node {0:?}")]
	UnknownNode(String),
	/// Drop cover needs another client to address.
	#[error("No other client to address drop cover to")]
	NoCoverRecipient,
	#[error("Missing argument --{0}")]
	MissingArgument(&'static str),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
	#[error("Storage IO error: {0}")]
	Io(#[from] io::Error),
	#[error("Directory database error: {0}")]
	Database(#[from] rusqlite::Error),
	/// Identifier cannot be used as a storage key.
	#[error("Invalid identifier {0:?}")]
	InvalidId(String),
	#[error("Corrupt record for {0:?}")]
	CorruptRecord(String),
}

/// Mixnet generic error.
#[derive(Debug, Error)]
pub enum Error {
	#[error("Sphinx packet error: {0}")]
	Packet(#[from] PacketError),
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error("Persistence error: {0}")]
	Persistence(#[from] PersistenceError),
	#[error("Network error: {0}")]
	Io(#[from] io::Error),
	/// Provider refused the client token or the client is not registered.
	#[error("Client {0:?} not authenticated")]
	Unauthenticated(String),
	/// Peer sent something the protocol does not allow at this point.
	#[error("Protocol violation: {0}")]
	Protocol(String),
	#[error("Fatal: {0}")]
	Fatal(String),
}

impl From<CryptoError> for Error {
	fn from(e: CryptoError) -> Self {
		Error::Packet(e.into())
	}
}

impl From<CodecError> for Error {
	fn from(e: CodecError) -> Self {
		Error::Packet(e.into())
	}
}

impl Error {
	/// Process exit code for this error: 1 for configuration problems, 2 otherwise.
	pub fn exit_code(&self) -> i32 {
		match self {
			Error::Config(_) => 1,
			_ => 2,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_codes() {
		assert_eq!(Error::from(ConfigError::EmptyMixSet).exit_code(), 1);
		assert_eq!(Error::Fatal("bind".into()).exit_code(), 2);
		assert_eq!(Error::from(CryptoError::BadKey).exit_code(), 2);
	}

	#[test]
	fn mac_mismatch_detection() {
		assert!(PacketError::from(CryptoError::MacMismatch).is_mac_mismatch());
		assert!(!PacketError::from(CodecError::BadSerialization).is_mac_mismatch());
	}
}
