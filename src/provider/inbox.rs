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


//! On-disk inboxes: `<root>/<client_id>/<message_id>` holding raw payload bytes.

use crate::core::PersistenceError;
use parking_lot::{Mutex, MutexGuard};
use std::{
	collections::hash_map::RandomState,
	fs,
	hash::BuildHasher,
	io,
	path::{Path, PathBuf},
};

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Number of locks inboxes are spread over.
const LOCK_STRIPES: usize = 64;

/// A message at rest in an inbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
	pub id: String,
	pub data: Vec<u8>,
}

/// Reject ids that are not a single plain path component.
pub fn validate_id(id: &str) -> Result<(), PersistenceError> {
	let valid = !id.is_empty() &&
		!id.starts_with('.') &&
		!id.chars().any(|c| c == '/' || c == '\\' || c == '\0');
	if valid {
		Ok(())
	} else {
		Err(PersistenceError::InvalidId(id.to_owned()))
	}
}

/// Inbox directories under a common root. Operations on one inbox are serialized through a fixed
/// set of lock stripes picked by a keyed hash of the inbox id.
pub struct InboxStore {
	root: PathBuf,
	locks: Box<[Mutex<()>]>,
	hasher: RandomState,
}

impl InboxStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
			hasher: RandomState::new(),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn stripe(&self, id: &str) -> usize {
		(self.hasher.hash_one(id) % LOCK_STRIPES as u64) as usize
	}

	fn lock(&self, id: &str) -> MutexGuard<'_, ()> {
		self.locks[self.stripe(id)].lock()
	}

	fn inbox_path(&self, id: &str) -> Result<PathBuf, PersistenceError> {
		validate_id(id)?;
		Ok(self.root.join(id))
	}

	/// Create the inbox if missing.
	pub fn create(&self, id: &str) -> Result<(), PersistenceError> {
		let path = self.inbox_path(id)?;
		let _guard = self.lock(id);
		create_dir(&path)
	}

	/// Store a message, creating the inbox if needed. Storing the same id twice keeps a single
	/// message.
	pub fn store(&self, id: &str, message_id: &str, data: &[u8]) -> Result<(), PersistenceError> {
		let path = self.inbox_path(id)?;
		validate_id(message_id)?;
		let _guard = self.lock(id);
		create_dir(&path)?;
		let tmp = path.join(format!(".{message_id}.tmp"));
		write_file(&tmp, data)?;
		fs::rename(&tmp, path.join(message_id))?;
		Ok(())
	}

	/// All messages of an inbox ordered by message id, or `None` if the inbox does not exist.
	pub fn fetch(&self, id: &str) -> Result<Option<Vec<StoredMessage>>, PersistenceError> {
		let path = self.inbox_path(id)?;
		let _guard = self.lock(id);
		let entries = match fs::read_dir(&path) {
			Ok(entries) => entries,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		let mut messages = Vec::new();
		for entry in entries {
			let entry = entry?;
			let Some(name) = entry.file_name().to_str().map(str::to_owned) else { continue };
			if validate_id(&name).is_err() || !entry.file_type()?.is_file() {
				continue
			}
			messages.push(StoredMessage { data: fs::read(entry.path())?, id: name });
		}
		messages.sort_by(|a, b| a.id.cmp(&b.id));
		Ok(Some(messages))
	}

	/// Remove delivered messages. Messages already gone are ignored.
	pub fn remove(&self, id: &str, message_ids: &[String]) -> Result<(), PersistenceError> {
		let path = self.inbox_path(id)?;
		let _guard = self.lock(id);
		for message_id in message_ids {
			validate_id(message_id)?;
			match fs::remove_file(path.join(message_id)) {
				Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
				_ => (),
			}
		}
		Ok(())
	}
}

#[cfg(unix)]
fn create_dir(path: &Path) -> Result<(), PersistenceError> {
	use std::os::unix::fs::DirBuilderExt;
	fs::DirBuilder::new().recursive(true).mode(DIR_MODE).create(path)?;
	Ok(())
}

#[cfg(not(unix))]
fn create_dir(path: &Path) -> Result<(), PersistenceError> {
	let _ = DIR_MODE;
	fs::create_dir_all(path)?;
	Ok(())
}

#[cfg(unix)]
fn write_file(path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
	use std::{io::Write, os::unix::fs::OpenOptionsExt};
	let mut file =
		fs::OpenOptions::new().write(true).create(true).truncate(true).mode(FILE_MODE).open(path)?;
	file.write_all(data)?;
	Ok(())
}

#[cfg(not(unix))]
fn write_file(path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
	let _ = FILE_MODE;
	fs::write(path, data)?;
	Ok(())
}
