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

//! Key exchange, key derivation, MAC computation, and encryption.

use crate::core::error::CryptoError;
use aes::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac as _};
use p224::{
	elliptic_curve::{
		sec1::{FromEncodedPoint, ToEncodedPoint},
		Group, PrimeField,
	},
	AffinePoint, EncodedPoint, FieldBytes, NonZeroScalar, ProjectivePoint, Scalar,
};
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};

type AesCtr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Size in bytes of a symmetric packet key.
pub const KEY_SIZE: usize = 16;
pub type Key = [u8; KEY_SIZE];

pub const MAC_SIZE: usize = 32;
pub type Mac = [u8; MAC_SIZE];

/// Size in bytes of an uncompressed SEC1 P-224 point.
pub const GROUP_ELEMENT_SIZE: usize = 57;

const FIELD_SIZE: usize = 28;

/// Layer IV. Every hop encrypts under its own key, so the IV is a public constant.
pub const ZERO_IV: [u8; KEY_SIZE] = [0; KEY_SIZE];
pub const BLINDING_IV: &[u8; KEY_SIZE] = b"initialvector000";
pub const FILLER_IV: &[u8; KEY_SIZE] = b"hrhohrhohrhohrho";

pub type Point = ProjectivePoint;
pub type PublicKey = p224::PublicKey;
pub type SecretKey = p224::SecretKey;

////////////////////////////////////////////////////////////////////////////////
// Key derivation
////////////////////////////////////////////////////////////////////////////////

/// SHA-256 of `seed`, truncated to [`KEY_SIZE`].
pub fn kdf(seed: &[u8]) -> Key {
	let digest = Sha256::digest(seed);
	let mut key = [0; KEY_SIZE];
	key.copy_from_slice(&digest[..KEY_SIZE]);
	key
}

////////////////////////////////////////////////////////////////////////////////
// Layer encryption
////////////////////////////////////////////////////////////////////////////////

/// AES-128-CTR over `data` with an explicit IV. Encryption and decryption are the same operation.
pub fn aes_ctr_with_iv(key: &[u8], iv: &[u8; KEY_SIZE], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
	let mut cipher = AesCtr::new_from_slices(key, iv).map_err(|_| CryptoError::BadKey)?;
	let mut out = data.to_vec();
	cipher.apply_keystream(&mut out);
	Ok(out)
}

/// AES-128-CTR over `data` with the all-zero IV.
pub fn aes_ctr(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
	aes_ctr_with_iv(key, &ZERO_IV, data)
}

/// `len` bytes of AES-CTR keystream.
pub fn keystream(key: &[u8], iv: &[u8; KEY_SIZE], len: usize) -> Result<Vec<u8>, CryptoError> {
	aes_ctr_with_iv(key, iv, &vec![0; len])
}

////////////////////////////////////////////////////////////////////////////////
// MAC computation
////////////////////////////////////////////////////////////////////////////////

pub fn hmac(key: &[u8], msg: &[u8]) -> Mac {
	let mut h = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any size");
	h.update(msg);
	h.finalize().into_bytes().into()
}

/// Constant time check of `mac` against HMAC-SHA256(`key`, `msg`).
pub fn mac_ok(key: &[u8], msg: &[u8], mac: &[u8]) -> bool {
	let mut h = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any size");
	h.update(msg);
	h.verify_slice(mac).is_ok()
}

////////////////////////////////////////////////////////////////////////////////
// Group operations
////////////////////////////////////////////////////////////////////////////////

pub fn ecdh(scalar: &Scalar, point: &Point) -> Point {
	*point * scalar
}

pub fn group_base(scalar: &Scalar) -> Point {
	ProjectivePoint::GENERATOR * scalar
}

/// Uniform scalar in `[1, q-1]`.
pub fn random_scalar(rng: &mut (impl Rng + CryptoRng)) -> Scalar {
	*NonZeroScalar::random(rng)
}

/// Interpret `bytes` as a big-endian integer and map it to a non-zero scalar.
///
/// Inputs up to [`KEY_SIZE`] bytes are always below both the curve prime and the group order, so
/// the mapping is the identity on the integer value. Longer inputs are rejected.
pub fn bytes_to_scalar(bytes: &[u8]) -> Result<Scalar, CryptoError> {
	if bytes.len() > KEY_SIZE {
		return Err(CryptoError::BadKey)
	}
	let mut repr = FieldBytes::default();
	repr[FIELD_SIZE - bytes.len()..].copy_from_slice(bytes);
	let scalar: Option<Scalar> = Scalar::from_repr(repr).into();
	match scalar {
		Some(scalar) if !bool::from(scalar.is_zero()) => Ok(scalar),
		_ => Err(CryptoError::BadKey),
	}
}

/// Uncompressed SEC1 encoding.
pub fn marshal_point(point: &Point) -> Vec<u8> {
	point.to_affine().to_encoded_point(false).as_bytes().to_vec()
}

pub fn unmarshal_point(bytes: &[u8]) -> Result<Point, CryptoError> {
	if bytes.len() != GROUP_ELEMENT_SIZE {
		return Err(CryptoError::BadPoint)
	}
	let encoded = EncodedPoint::from_bytes(bytes).map_err(|_| CryptoError::BadPoint)?;
	let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
	let point = affine.map(ProjectivePoint::from).ok_or(CryptoError::BadPoint)?;
	if bool::from(point.is_identity()) {
		return Err(CryptoError::BadPoint)
	}
	Ok(point)
}

////////////////////////////////////////////////////////////////////////////////
// Long-term keys
////////////////////////////////////////////////////////////////////////////////

/// Generate a long-term key pair for a node or client.
pub fn generate_key_pair(rng: &mut (impl Rng + CryptoRng)) -> (PublicKey, SecretKey) {
	let secret = SecretKey::random(rng);
	(secret.public_key(), secret)
}

pub fn public_key_to_bytes(public: &PublicKey) -> Vec<u8> {
	public.to_encoded_point(false).as_bytes().to_vec()
}

pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
	if bytes.len() != GROUP_ELEMENT_SIZE {
		return Err(CryptoError::BadPoint)
	}
	PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::BadPoint)
}

/// The secret scalar of a long-term key.
pub fn secret_scalar(secret: &SecretKey) -> Scalar {
	*secret.to_nonzero_scalar()
}
