//! Top-level session assembly used by the transport layer
//!
//! Construction selects and configures the authentication mechanism; the
//! transport layer then drives `evaluate_challenge` until `is_complete`, and
//! only after completion may it install the negotiated cipher. The two
//! phases are strictly sequential: no payload encoding happens before the
//! negotiation completes.

use crate::auth::negotiator::Negotiator;
use crate::auth::{self, AuthAdvertisement, Credential};
use crate::cipher::{CipherMaterial, CipherSession};
use crate::error::{Error, Result};
use tracing::debug;

/// Authenticated, optionally encrypted channel state for one connection
pub struct SaslSession {
    negotiator: Negotiator,
    cipher: Option<CipherSession>,
}

impl SaslSession {
    /// Select the advertised method and configure its mechanism
    pub fn new(
        advertisement: &AuthAdvertisement,
        credential: &Credential,
        pre_encoded: bool,
    ) -> Result<Self> {
        let negotiator = auth::configure(advertisement, credential, pre_encoded)?;
        Ok(Self {
            negotiator,
            cipher: None,
        })
    }

    /// Feed the peer's challenge and produce the response to send
    pub fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        self.negotiator.evaluate_challenge(challenge)
    }

    /// Whether authentication has completed
    pub fn is_complete(&self) -> bool {
        self.negotiator.is_complete()
    }

    /// Install the cipher session from key material negotiated with the peer
    ///
    /// Valid only after authentication completes; the transport layer calls
    /// this once it has received the negotiated key material.
    pub fn establish_cipher(&mut self, material: &CipherMaterial) -> Result<()> {
        if !self.is_complete() {
            return Err(Error::Cipher(
                "cannot establish cipher before authentication completes".to_string(),
            ));
        }
        self.cipher = Some(CipherSession::new(material)?);
        debug!("payload encryption enabled");
        Ok(())
    }

    /// Whether payload encryption is active
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encrypt one outbound payload chunk
    pub fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        match self.cipher.as_mut() {
            Some(cipher) => cipher.encode(payload),
            None => Err(Error::Cipher("no cipher session established".to_string())),
        }
    }

    /// Decrypt one inbound payload chunk
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        match self.cipher.as_mut() {
            Some(cipher) => cipher.decode(payload),
            None => Err(Error::Cipher("no cipher session established".to_string())),
        }
    }
}
