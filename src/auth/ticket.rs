//! Ticket proof-of-possession mechanism
//!
//! Proves possession of an externally acquired service ticket without ever
//! transmitting its secret. The client forwards the opaque ticket blob
//! together with a keyed digest over both parties' challenges; the server
//! closes the exchange with a mutual-authentication proof over the client
//! challenge.

use crate::auth::mechanism::{Mechanism, Step};
use crate::auth::{SaslProperties, Ticket};
use crate::error::{Error, Result};
use byteorder::{BigEndian, WriteBytesExt};
use hmac::{Hmac, Mac};
use md5::Md5;
use rand::RngCore;
use zeroize::Zeroizing;

/// Mechanism name as advertised on the wire
pub const MECHANISM_NAME: &str = "TICKET-HMAC-MD5";

/// Length of the client's freshness challenge
pub const CLIENT_CHALLENGE_LEN: usize = 8;

type HmacMd5 = Hmac<Md5>;

/// Ticket mechanism state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketState {
    Initial,
    ProofSent,
    Complete,
}

/// Ticket proof-of-possession client session
pub struct TicketSession {
    principal: String,
    service: String,
    server_id: String,
    session_key: Zeroizing<Vec<u8>>,
    blob: Vec<u8>,
    client_challenge: [u8; CLIENT_CHALLENGE_LEN],
    state: TicketState,
}

impl TicketSession {
    /// Create a session from configured properties and the ticket credential
    pub fn new(properties: &SaslProperties, ticket: &Ticket) -> Result<Self> {
        if ticket.session_key.is_empty() {
            return Err(Error::Authentication(
                "ticket carries no session key".to_string(),
            ));
        }
        let principal = String::from_utf8(properties.authid.clone())
            .map_err(|_| Error::Authentication("principal is not valid text".to_string()))?;

        let mut client_challenge = [0u8; CLIENT_CHALLENGE_LEN];
        rand::thread_rng().fill_bytes(&mut client_challenge);

        Ok(Self {
            principal,
            service: properties.service.clone(),
            server_id: properties.server_id.clone(),
            session_key: ticket.session_key.clone(),
            blob: ticket.blob.clone(),
            client_challenge,
            state: TicketState::Initial,
        })
    }

    /// Build the proof token answering the server's challenge
    ///
    /// Token layout, all lengths big-endian: `u16` principal, `u16` service,
    /// `u16` server id, `u32` ticket blob, 8-byte client challenge, `u16`
    /// proof.
    fn build_proof_token(&self, server_challenge: &[u8]) -> Result<Vec<u8>> {
        let proof = keyed_proof(
            &self.session_key,
            &[
                server_challenge,
                &self.client_challenge,
                self.principal.as_bytes(),
                self.service.as_bytes(),
                self.server_id.as_bytes(),
            ],
        )?;

        let mut token = Vec::new();
        write_field_u16(&mut token, self.principal.as_bytes())?;
        write_field_u16(&mut token, self.service.as_bytes())?;
        write_field_u16(&mut token, self.server_id.as_bytes())?;
        let blob_len = u32::try_from(self.blob.len())
            .map_err(|_| Error::Authentication("ticket blob too large".to_string()))?;
        token.write_u32::<BigEndian>(blob_len)?;
        token.extend_from_slice(&self.blob);
        token.extend_from_slice(&self.client_challenge);
        write_field_u16(&mut token, &proof)?;
        Ok(token)
    }

    /// Verify the server's mutual-authentication proof over our challenge
    fn verify_server_proof(&self, server_proof: &[u8]) -> Result<()> {
        let mut mac = mac_for(&self.session_key)?;
        mac.update(&self.client_challenge);
        mac.verify_slice(server_proof)
            .map_err(|_| Error::Authentication("server failed mutual authentication".to_string()))
    }
}

impl Mechanism for TicketSession {
    fn name(&self) -> &'static str {
        MECHANISM_NAME
    }

    fn step(&mut self, challenge: &[u8]) -> Result<Step> {
        match self.state {
            TicketState::Initial => {
                if challenge.is_empty() {
                    return Err(Error::Authentication(
                        "empty server challenge".to_string(),
                    ));
                }
                let token = self.build_proof_token(challenge)?;
                self.state = TicketState::ProofSent;
                Ok(Step::Continue(token))
            }
            TicketState::ProofSent => {
                self.verify_server_proof(challenge)?;
                self.state = TicketState::Complete;
                Ok(Step::Finished(Vec::new()))
            }
            TicketState::Complete => Err(Error::Authentication(
                "mechanism already completed".to_string(),
            )),
        }
    }
}

fn mac_for(key: &[u8]) -> Result<HmacMd5> {
    HmacMd5::new_from_slice(key)
        .map_err(|e| Error::Authentication(format!("invalid ticket session key: {}", e)))
}

/// HMAC-MD5 over the concatenation of `parts`
fn keyed_proof(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
    let mut mac = mac_for(key)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Write a u16-length-prefixed field, asserting the bound
fn write_field_u16(buf: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len())
        .map_err(|_| Error::Authentication("token field too large".to_string()))?;
    buf.write_u16::<BigEndian>(len)?;
    buf.extend_from_slice(data);
    Ok(())
}
