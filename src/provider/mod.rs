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


//! Provider inbox service: client registration, token authentication, store and fetch.

mod inbox;

pub use inbox::{validate_id, InboxStore, StoredMessage};

use crate::core::{Error, PersistenceError};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use std::{collections::HashMap, path::PathBuf};
use subtle::ConstantTimeEq;

/// Size in bytes of a client token.
pub const TOKEN_SIZE: usize = 8;
pub type Token = [u8; TOKEN_SIZE];

/// Size in bytes of the random part of a message id.
const MESSAGE_ID_SIZE: usize = 16;

/// A client registered with this provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientRecord {
	pub id: String,
	pub host: String,
	pub port: String,
	pub pub_key: Vec<u8>,
	token: Token,
}

/// Fetch reply signal, two ASCII bytes on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
	/// Messages follow.
	SI,
	/// Inbox exists and is empty.
	EI,
	/// No such inbox.
	NI,
}

impl Signal {
	pub fn as_bytes(self) -> &'static [u8; 2] {
		match self {
			Signal::SI => b"SI",
			Signal::EI => b"EI",
			Signal::NI => b"NI",
		}
	}

	pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
		match bytes {
			b"SI" => Some(Signal::SI),
			b"EI" => Some(Signal::EI),
			b"NI" => Some(Signal::NI),
			_ => None,
		}
	}
}

/// Result of a fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetched {
	/// At least one message, to be delivered then acknowledged.
	Messages(Vec<StoredMessage>),
	Empty,
	NoInbox,
}

impl Fetched {
	pub fn signal(&self) -> Signal {
		match self {
			Fetched::Messages(_) => Signal::SI,
			Fetched::Empty => Signal::EI,
			Fetched::NoInbox => Signal::NI,
		}
	}
}

/// Fresh random message id, lower-case hex.
pub fn new_message_id() -> String {
	let mut id = [0u8; MESSAGE_ID_SIZE];
	OsRng.fill_bytes(&mut id);
	hex::encode(id)
}

/// Inbox service of a provider node.
pub struct Provider {
	clients: RwLock<HashMap<String, ClientRecord>>,
	inboxes: InboxStore,
}

impl Provider {
	pub fn new(inbox_root: impl Into<PathBuf>) -> Self {
		Self { clients: RwLock::new(HashMap::new()), inboxes: InboxStore::new(inbox_root) }
	}

	pub fn inboxes(&self) -> &InboxStore {
		&self.inboxes
	}

	/// Register a client and return its fresh token. Registering again replaces the record and
	/// rotates the token. The client's inbox is created empty if missing.
	pub fn register_client(
		&self,
		id: &str,
		host: &str,
		port: &str,
		pub_key: Vec<u8>,
	) -> Result<Token, PersistenceError> {
		self.inboxes.create(id)?;
		let mut token = [0u8; TOKEN_SIZE];
		OsRng.fill_bytes(&mut token);
		let record = ClientRecord {
			id: id.to_owned(),
			host: host.to_owned(),
			port: port.to_owned(),
			pub_key,
			token,
		};
		let previous = self.clients.write().insert(id.to_owned(), record);
		log::info!(
			target: "loopix",
			"{} client {} at {}:{}",
			if previous.is_some() { "Re-registered" } else { "Registered" },
			id,
			host,
			port
		);
		Ok(token)
	}

	pub fn client(&self, id: &str) -> Option<ClientRecord> {
		self.clients.read().get(id).cloned()
	}

	/// Constant time token check. Unknown clients never authenticate.
	pub fn authenticate(&self, id: &str, token: &[u8]) -> bool {
		match self.clients.read().get(id) {
			Some(record) => bool::from(record.token[..].ct_eq(token)),
			None => false,
		}
	}

	/// Store a message in an inbox, creating the inbox if needed.
	pub fn store_message(
		&self,
		inbox_id: &str,
		message_id: &str,
		data: &[u8],
	) -> Result<(), PersistenceError> {
		self.inboxes.store(inbox_id, message_id, data)?;
		log::trace!(target: "loopix", "Stored {} bytes for {}", data.len(), inbox_id);
		Ok(())
	}

	/// Store a payload coming out of the last hop under a fresh message id.
	pub fn deliver(&self, recipient: &str, payload: &[u8]) -> Result<String, PersistenceError> {
		let message_id = new_message_id();
		self.store_message(recipient, &message_id, payload)?;
		Ok(message_id)
	}

	/// Snapshot of an inbox. Nothing is removed until [`Provider::acknowledge`].
	pub fn fetch_messages(&self, inbox_id: &str) -> Result<Fetched, PersistenceError> {
		Ok(match self.inboxes.fetch(inbox_id)? {
			None => Fetched::NoInbox,
			Some(messages) if messages.is_empty() => Fetched::Empty,
			Some(messages) => Fetched::Messages(messages),
		})
	}

	/// Authenticated fetch on behalf of a client.
	pub fn pull(&self, client_id: &str, token: &[u8]) -> Result<Fetched, Error> {
		if !self.authenticate(client_id, token) {
			log::debug!(target: "loopix", "Rejected pull for {}", client_id);
			return Err(Error::Unauthenticated(client_id.to_owned()))
		}
		Ok(self.fetch_messages(client_id)?)
	}

	/// Remove messages the client confirmed receiving.
	pub fn acknowledge(&self, inbox_id: &str, message_ids: &[String]) -> Result<(), PersistenceError> {
		self.inboxes.remove(inbox_id, message_ids)?;
		log::trace!(target: "loopix", "Removed {} delivered messages of {}", message_ids.len(), inbox_id);
		Ok(())
	}
}
