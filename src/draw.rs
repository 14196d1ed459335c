//! Draw engine
//!
//! Schnorrkel-backed randomness for winner draws and dice rolls. The draw
//! input is fixed only at resolution time (session fill or payment
//! confirmation) and the signing key is server-held, so no player can
//! predict an outcome while buy-ins are still being captured. Every draw
//! ships with a [`DrawProof`] bundle that third parties can verify offline
//! (see the `verify_draw` binary).

use crate::errors::{GameError, GameResult};
use crate::odds::BASIS_POINTS;
use schnorrkel::context::SigningContext;
use schnorrkel::{ExpansionMode, Keypair, MiniSecretKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const DRAW_SIGNING_CONTEXT: &[u8] = b"satsdice-draw";

/// Verifiable record of a single draw.
///
/// `output` is the SHA-256 of the schnorrkel signature over `input`;
/// `proof` is the signature itself. Anyone holding the bundle can check
/// that the signature verifies under `public_key` and that `output` is
/// derived from it, then recompute the roll or winner index from `output`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawProof {
    /// Domain-separated draw input, e.g. `winner:<session_id>:<n>`.
    pub input: String,
    /// Hex SHA-256 of the signature bytes.
    pub output: String,
    /// Hex signature bytes.
    pub proof: String,
    /// Hex house public key.
    pub public_key: String,
}

/// House draw engine wrapping a schnorrkel keypair.
pub struct DrawEngine {
    keypair: Arc<Keypair>,
}

impl DrawEngine {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Engine with a fresh random keypair.
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        Self::new(Keypair::generate_with(OsRng))
    }

    /// Engine from a 32-byte seed, for a stable house key across restarts.
    pub fn from_seed(seed: &[u8]) -> GameResult<Self> {
        let mini = MiniSecretKey::from_bytes(seed)
            .map_err(|e| GameError::validation(format!("bad draw key seed: {e:?}")))?;
        Ok(Self::new(mini.expand_to_keypair(ExpansionMode::Ed25519)))
    }

    /// Pick a winner index among `participants` entrants.
    pub fn winner_index(&self, session_id: &str, participants: usize) -> (usize, DrawProof) {
        let input = format!("winner:{}:{}", session_id, participants);
        let (output, proof) = self.draw(&input);
        (reduce_index(&output, participants), proof)
    }

    /// Basis-point roll in `[0, BASIS_POINTS)` for a single bet.
    pub fn roll(&self, payment_hash: &str) -> (u32, DrawProof) {
        let input = format!("roll:{}", payment_hash);
        let (output, proof) = self.draw(&input);
        (reduce_roll(&output), proof)
    }

    /// Sign the input and derive the draw output from the signature.
    fn draw(&self, input: &str) -> ([u8; 32], DrawProof) {
        let ctx = SigningContext::new(DRAW_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(input.as_bytes()));

        let mut hasher = Sha256::new();
        hasher.update(signature.to_bytes());
        let output: [u8; 32] = hasher.finalize().into();

        let bundle = DrawProof {
            input: input.to_string(),
            output: hex::encode(output),
            proof: hex::encode(signature.to_bytes()),
            public_key: hex::encode(self.keypair.public.to_bytes()),
        };
        (output, bundle)
    }

    /// Verify a proof bundle: signature valid under the bundled key, and
    /// output correctly derived from the signature.
    pub fn verify(bundle: &DrawProof) -> GameResult<bool> {
        let output = hex::decode(&bundle.output)
            .map_err(|e| GameError::validation(format!("invalid output hex: {e}")))?;
        let proof = hex::decode(&bundle.proof)
            .map_err(|e| GameError::validation(format!("invalid proof hex: {e}")))?;
        let key_bytes = hex::decode(&bundle.public_key)
            .map_err(|e| GameError::validation(format!("invalid public key hex: {e}")))?;

        let key_array: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| GameError::validation("public key must be 32 bytes"))?;
        let public_key = PublicKey::from_bytes(&key_array)
            .map_err(|e| GameError::validation(format!("invalid public key: {e:?}")))?;

        let sig_array: [u8; 64] = proof
            .try_into()
            .map_err(|_| GameError::validation("proof must be 64 bytes"))?;
        let signature = Signature::from_bytes(&sig_array)
            .map_err(|e| GameError::validation(format!("invalid signature: {e:?}")))?;

        let ctx = SigningContext::new(DRAW_SIGNING_CONTEXT);
        if public_key
            .verify(ctx.bytes(bundle.input.as_bytes()), &signature)
            .is_err()
        {
            return Ok(false);
        }

        let mut hasher = Sha256::new();
        hasher.update(sig_array);
        Ok(hasher.finalize().as_slice() == output.as_slice())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }
}

/// Reduce a draw output to an index in `[0, n)`.
pub fn reduce_index(output: &[u8], n: usize) -> usize {
    debug_assert!(n > 0);
    let mut first = [0u8; 8];
    first.copy_from_slice(&output[..8]);
    (u64::from_be_bytes(first) % n as u64) as usize
}

/// Reduce a draw output to a basis-point roll.
pub fn reduce_roll(output: &[u8]) -> u32 {
    let mut first = [0u8; 8];
    first.copy_from_slice(&output[..8]);
    (u64::from_be_bytes(first) % BASIS_POINTS as u64) as u32
}
