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


#![allow(dead_code)]

use loopix::{
	core::{sphinx::crypto::generate_key_pair, SecretKey},
	ClientDescriptor, NodeDescriptor,
};
use std::{collections::HashMap, path::PathBuf};

pub fn init_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// Descriptors with known secrets, for processing packets by hand.
#[derive(Default)]
pub struct KeyRing {
	pub secrets: HashMap<String, SecretKey>,
}

impl KeyRing {
	pub fn node(&mut self, id: &str, port: u16) -> NodeDescriptor {
		let (pub_key, secret) = generate_key_pair(&mut rand::thread_rng());
		self.secrets.insert(id.to_owned(), secret);
		NodeDescriptor { id: id.into(), host: "127.0.0.1".into(), port: port.to_string(), pub_key }
	}

	pub fn client(&mut self, id: &str, provider: &NodeDescriptor) -> ClientDescriptor {
		let (pub_key, secret) = generate_key_pair(&mut rand::thread_rng());
		self.secrets.insert(id.to_owned(), secret);
		ClientDescriptor {
			id: id.into(),
			host: "127.0.0.1".into(),
			port: "0".into(),
			pub_key,
			provider: provider.clone(),
		}
	}

	pub fn secret(&self, id: &str) -> &SecretKey {
		&self.secrets[id]
	}
}

/// Fresh empty directory under the system temp dir.
pub fn temp_dir(name: &str) -> PathBuf {
	let dir = std::env::temp_dir()
		.join(format!("loopix-it-{}-{}-{}", name, std::process::id(), rand::random::<u32>()));
	let _ = std::fs::remove_dir_all(&dir);
	dir
}
