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


//! SQLite backed node and client directory.
//!
//! Tables:
//!
//! - `Mixes(MixId TEXT PRIMARY KEY, Host TEXT, Port TEXT, PubKey BLOB)`
//! - `Providers(ProviderId TEXT PRIMARY KEY, Host TEXT, Port TEXT, PubKey BLOB)`
//! - `Clients(ClientId TEXT PRIMARY KEY, Host TEXT, Port TEXT, PubKey BLOB, Provider TEXT)`
//!
//! Public keys are stored as uncompressed SEC1 points.

use crate::{
	core::{sphinx::crypto, ClientDescriptor, NodeDescriptor, PersistenceError},
	traits::Directory,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const SCHEMA: &str = "
	CREATE TABLE IF NOT EXISTS Mixes (
		MixId TEXT PRIMARY KEY, Host TEXT NOT NULL, Port TEXT NOT NULL, PubKey BLOB NOT NULL);
	CREATE TABLE IF NOT EXISTS Providers (
		ProviderId TEXT PRIMARY KEY, Host TEXT NOT NULL, Port TEXT NOT NULL, PubKey BLOB NOT NULL);
	CREATE TABLE IF NOT EXISTS Clients (
		ClientId TEXT PRIMARY KEY, Host TEXT NOT NULL, Port TEXT NOT NULL, PubKey BLOB NOT NULL,
		Provider TEXT NOT NULL);
";

#[derive(Clone, Copy)]
enum NodeTable {
	Mixes,
	Providers,
}

impl NodeTable {
	fn name(self) -> &'static str {
		match self {
			NodeTable::Mixes => "Mixes",
			NodeTable::Providers => "Providers",
		}
	}

	fn key(self) -> &'static str {
		match self {
			NodeTable::Mixes => "MixId",
			NodeTable::Providers => "ProviderId",
		}
	}
}

/// Client row before its provider is resolved.
struct ClientRow {
	id: String,
	host: String,
	port: String,
	pub_key: Vec<u8>,
	provider: String,
}

/// Directory in a single SQLite database. Connection access is serialized.
pub struct SqliteDirectory {
	connection: Mutex<Connection>,
}

impl SqliteDirectory {
	/// Open or create the database at `path`.
	pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
		Self::init(Connection::open(path)?)
	}

	/// Private in-memory database.
	pub fn open_in_memory() -> Result<Self, PersistenceError> {
		Self::init(Connection::open_in_memory()?)
	}

	fn init(connection: Connection) -> Result<Self, PersistenceError> {
		connection.execute_batch(SCHEMA)?;
		Ok(Self { connection: Mutex::new(connection) })
	}

	fn publish_node(&self, table: NodeTable, node: &NodeDescriptor) -> Result<(), PersistenceError> {
		let sql = format!(
			"INSERT OR REPLACE INTO {} ({}, Host, Port, PubKey) VALUES (?1, ?2, ?3, ?4)",
			table.name(),
			table.key()
		);
		self.connection.lock().execute(
			&sql,
			params![node.id, node.host, node.port, crypto::public_key_to_bytes(&node.pub_key)],
		)?;
		log::debug!(target: "loopix", "Published {} entry {}", table.name(), node.id);
		Ok(())
	}

	fn node(&self, table: NodeTable, id: &str) -> Result<Option<NodeDescriptor>, PersistenceError> {
		let sql = format!("SELECT * FROM {} WHERE {} = ?1", table.name(), table.key());
		let row = self.connection.lock().query_row(&sql, [id], node_row).optional()?;
		row.map(into_node).transpose()
	}

	fn nodes(&self, table: NodeTable) -> Result<Vec<NodeDescriptor>, PersistenceError> {
		let sql = format!("SELECT * FROM {} ORDER BY {}", table.name(), table.key());
		let rows = {
			let connection = self.connection.lock();
			let mut statement = connection.prepare(&sql)?;
			let rows = statement.query_map([], node_row)?.collect::<Result<Vec<_>, _>>()?;
			rows
		};
		rows.into_iter().map(into_node).collect()
	}

	fn resolve_client(&self, row: ClientRow) -> Result<ClientDescriptor, PersistenceError> {
		let provider = self
			.node(NodeTable::Providers, &row.provider)?
			.ok_or_else(|| PersistenceError::CorruptRecord(row.id.clone()))?;
		let pub_key = crypto::public_key_from_bytes(&row.pub_key)
			.map_err(|_| PersistenceError::CorruptRecord(row.id.clone()))?;
		Ok(ClientDescriptor { id: row.id, host: row.host, port: row.port, pub_key, provider })
	}
}

type NodeRow = (String, String, String, Vec<u8>);

fn node_row(row: &Row) -> rusqlite::Result<NodeRow> {
	Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_node((id, host, port, pub_key): NodeRow) -> Result<NodeDescriptor, PersistenceError> {
	let pub_key = crypto::public_key_from_bytes(&pub_key)
		.map_err(|_| PersistenceError::CorruptRecord(id.clone()))?;
	Ok(NodeDescriptor { id, host, port, pub_key })
}

fn client_row(row: &Row) -> rusqlite::Result<ClientRow> {
	Ok(ClientRow {
		id: row.get(0)?,
		host: row.get(1)?,
		port: row.get(2)?,
		pub_key: row.get(3)?,
		provider: row.get(4)?,
	})
}

impl Directory for SqliteDirectory {
	fn publish_mix(&self, node: &NodeDescriptor) -> Result<(), PersistenceError> {
		self.publish_node(NodeTable::Mixes, node)
	}

	fn publish_provider(&self, node: &NodeDescriptor) -> Result<(), PersistenceError> {
		self.publish_node(NodeTable::Providers, node)
	}

	fn publish_client(&self, client: &ClientDescriptor) -> Result<(), PersistenceError> {
		self.connection.lock().execute(
			"INSERT OR REPLACE INTO Clients (ClientId, Host, Port, PubKey, Provider)
			VALUES (?1, ?2, ?3, ?4, ?5)",
			params![
				client.id,
				client.host,
				client.port,
				crypto::public_key_to_bytes(&client.pub_key),
				client.provider.id
			],
		)?;
		log::debug!(target: "loopix", "Published client {} at {}", client.id, client.provider.id);
		Ok(())
	}

	fn mix(&self, id: &str) -> Result<Option<NodeDescriptor>, PersistenceError> {
		self.node(NodeTable::Mixes, id)
	}

	fn provider(&self, id: &str) -> Result<Option<NodeDescriptor>, PersistenceError> {
		self.node(NodeTable::Providers, id)
	}

	fn client(&self, id: &str) -> Result<Option<ClientDescriptor>, PersistenceError> {
		let row = self
			.connection
			.lock()
			.query_row("SELECT * FROM Clients WHERE ClientId = ?1", [id], client_row)
			.optional()?;
		row.map(|row| self.resolve_client(row)).transpose()
	}

	fn mixes(&self) -> Result<Vec<NodeDescriptor>, PersistenceError> {
		self.nodes(NodeTable::Mixes)
	}

	fn providers(&self) -> Result<Vec<NodeDescriptor>, PersistenceError> {
		self.nodes(NodeTable::Providers)
	}

	fn clients(&self) -> Result<Vec<ClientDescriptor>, PersistenceError> {
		let rows = {
			let connection = self.connection.lock();
			let mut statement = connection.prepare("SELECT * FROM Clients ORDER BY ClientId")?;
			let rows = statement.query_map([], client_row)?.collect::<Result<Vec<_>, _>>()?;
			rows
		};
		rows.into_iter().map(|row| self.resolve_client(row)).collect()
	}
}
