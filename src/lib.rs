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


//! Loopix mix network.
//!
//! Senders wrap messages in Sphinx packets routed through their provider, a random sequence of
//! mixes and the recipient's provider. Every hop holds a packet for an exponentially distributed
//! delay before forwarding it. Providers keep per-client inboxes that clients pull from.

pub mod client;
pub mod core;
pub mod directory;
pub mod network;
pub mod provider;
pub mod traits;

pub use crate::{
	client::Client,
	core::{
		choose_random_path, encode_message, generate_delay_sequence, generate_new_keys,
		process_packet, ClientDescriptor, Config, E2EPath, Error, NodeDescriptor, SphinxPacket,
	},
	directory::SqliteDirectory,
	network::{Node, Role, TcpTransport},
	provider::Provider,
};
