//! Run-scoped callback tokens (§6.1): the `Authorization: Bearer <token>`
//! a runtime adapter attaches to every `tools.*` callback, HMAC-signed so
//! the gateway can verify a callback actually belongs to the run it
//! claims without a round trip to a session store.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed callback token")]
    Malformed,
    #[error("callback token signature mismatch")]
    BadSignature,
    #[error("callback token is for a different run")]
    WrongRun,
}

/// Mints and verifies callback tokens of the form `<run_id>.<hex hmac>`.
///
/// One instance per gateway process, constructed from the signing key
/// named by `runtime.remote_worker.callback_signing_key_env` (§10.3).
pub struct CallbackTokenizer {
    key: Vec<u8>,
}

impl CallbackTokenizer {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    pub fn mint(&self, run_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(run_id.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("{run_id}.{sig}")
    }

    /// Verify a token and return the run id it was minted for.
    pub fn verify(&self, token: &str, expected_run_id: &str) -> Result<(), TokenError> {
        let (run_id, sig_hex) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        if run_id != expected_run_id {
            return Err(TokenError::WrongRun);
        }
        let sig = hex::decode(sig_hex).map_err(|_| TokenError::Malformed)?;

        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(run_id.as_bytes());
        let expected = mac.finalize().into_bytes();

        if expected.ct_eq(&sig).unwrap_u8() == 1 {
            Ok(())
        } else {
            Err(TokenError::BadSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_verify_round_trips() {
        let t = CallbackTokenizer::new(b"secret".to_vec());
        let token = t.mint("run-1");
        assert!(t.verify(&token, "run-1").is_ok());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let t = CallbackTokenizer::new(b"secret".to_vec());
        let mut token = t.mint("run-1");
        token.push('0');
        assert!(matches!(t.verify(&token, "run-1"), Err(TokenError::BadSignature) | Err(TokenError::Malformed)));
    }

    #[test]
    fn token_for_a_different_run_is_rejected() {
        let t = CallbackTokenizer::new(b"secret".to_vec());
        let token = t.mint("run-1");
        assert!(matches!(t.verify(&token, "run-2"), Err(TokenError::WrongRun)));
    }

    #[test]
    fn different_keys_disagree() {
        let a = CallbackTokenizer::new(b"secret-a".to_vec());
        let b = CallbackTokenizer::new(b"secret-b".to_vec());
        let token = a.mint("run-1");
        assert!(matches!(b.verify(&token, "run-1"), Err(TokenError::BadSignature)));
    }
}
