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


//! Pluggable collaborators of nodes and clients.

use crate::core::{ClientDescriptor, NodeDescriptor, PersistenceError};
use futures::future::BoxFuture;
use std::io;

/// Published node and client descriptors, keyed by id.
///
/// Writes happen at registration and node start-up only; everything else reads.
pub trait Directory: Send + Sync + 'static {
	/// Insert or replace the descriptor of a mix.
	fn publish_mix(&self, node: &NodeDescriptor) -> Result<(), PersistenceError>;

	/// Insert or replace the descriptor of a provider.
	fn publish_provider(&self, node: &NodeDescriptor) -> Result<(), PersistenceError>;

	/// Insert or replace the descriptor of a client. Its provider is stored by id.
	fn publish_client(&self, client: &ClientDescriptor) -> Result<(), PersistenceError>;

	fn mix(&self, id: &str) -> Result<Option<NodeDescriptor>, PersistenceError>;

	fn provider(&self, id: &str) -> Result<Option<NodeDescriptor>, PersistenceError>;

	/// Client descriptor with its provider resolved.
	fn client(&self, id: &str) -> Result<Option<ClientDescriptor>, PersistenceError>;

	fn mixes(&self) -> Result<Vec<NodeDescriptor>, PersistenceError>;

	fn providers(&self) -> Result<Vec<NodeDescriptor>, PersistenceError>;

	fn clients(&self) -> Result<Vec<ClientDescriptor>, PersistenceError>;
}

/// Fire-and-forget delivery of a frame to a `host:port` address.
///
/// A single attempt is made; the caller decides what a failure means.
pub trait Transport: Send + Sync + 'static {
	fn send(&self, address: &str, frame: Vec<u8>) -> BoxFuture<'static, io::Result<()>>;
}
