use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    rand::RngCore,
    secrecy::Secret,
    sha2::{Digest, Sha256},
};

use crate::types::PkceChallenge;

/// Random bytes behind a verifier; encodes to 43 characters, the RFC 7636 minimum.
const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

fn random_token<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge for a verifier: `base64url(sha256(verifier))`.
pub fn derive_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Generate a PKCE S256 challenge pair.
pub fn generate_pkce() -> PkceChallenge {
    let verifier = random_token::<VERIFIER_BYTES>();
    let challenge = derive_challenge(&verifier);
    PkceChallenge {
        verifier: Secret::new(verifier),
        challenge,
    }
}

/// Generate a random anti-CSRF state parameter.
pub fn generate_state() -> String {
    random_token::<STATE_BYTES>()
}
