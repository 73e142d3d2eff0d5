//! Authentication mechanisms for the SASL channel
//!
//! The method selector maps the peer's advertised authentication method to
//! one of the two supported mechanism implementations and hands a configured
//! negotiator back to the session assembly.

pub mod digest_md5;
pub mod mechanism;
pub mod negotiator;
pub mod ticket;

use crate::codec;
use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use tracing::debug;
use zeroize::Zeroizing;

use self::digest_md5::DigestMd5Session;
use self::negotiator::Negotiator;
use self::ticket::TicketSession;

/// Supported authentication methods
///
/// Selected once per session, immutable thereafter. The closed variant set
/// makes adding a method a compile-time exhaustiveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Previously acquired, externally managed credential
    Ticket,
    /// Shared-secret token
    Token,
}

impl AuthMethod {
    /// Parse the method enumerant from the peer's negotiation message
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "KERBEROS" => Ok(Self::Ticket),
            "TOKEN" => Ok(Self::Token),
            other => Err(Error::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Mechanism advertisement received from the peer's negotiation message
///
/// Supplied by the external protocol layer; the RPC envelope itself is not
/// parsed here.
#[derive(Debug, Clone)]
pub struct AuthAdvertisement {
    /// Authentication method enumerant, e.g. "KERBEROS" or "TOKEN"
    pub method: String,
    /// SASL mechanism name
    pub mechanism: String,
    /// Service protocol component of the server principal
    pub protocol: String,
    /// Server's declared identity/hostname
    pub server_id: String,
}

/// Caller-supplied credential driving the selected mechanism
pub enum Credential {
    /// Ticket credential for the ticket-based method
    Ticket(Ticket),
    /// Shared-secret token for the token-based method
    Token(Token),
}

/// Externally acquired ticket credential
///
/// Acquisition and renewal are out of scope; the caller obtains the ticket
/// from its credential machinery and hands it in whole.
pub struct Ticket {
    /// Principal the ticket was issued to
    pub principal: String,
    /// Session key carried by the ticket; never transmitted
    pub session_key: Zeroizing<Vec<u8>>,
    /// Opaque service ticket blob, forwarded verbatim to the peer
    pub blob: Vec<u8>,
}

/// Shared-secret token credential
pub struct Token {
    /// Token identifier
    pub identifier: Vec<u8>,
    /// Token secret
    pub password: Zeroizing<Vec<u8>>,
}

/// Parameters handed to a mechanism session at configuration time
pub struct SaslProperties {
    /// Mechanism name advertised by the peer
    pub mechanism: String,
    /// Service protocol component of the server principal
    pub service: String,
    /// Server's declared identity/hostname
    pub server_id: String,
    /// Authentication identity: principal, or transport-encoded token
    /// identifier
    pub authid: Vec<u8>,
    /// Shared secret, already transport-encoded (token path only)
    pub secret: Option<Zeroizing<Vec<u8>>>,
    /// The identity was produced already transport-encoded upstream and must
    /// be passed through verbatim; re-encoding would desynchronize it from
    /// the peer's expectation
    pub pre_encoded: bool,
}

/// Process-wide mechanism table, built exactly once on first use
struct MechanismRegistry {
    ticket: &'static str,
    token: &'static str,
}

impl MechanismRegistry {
    fn bootstrap() -> Self {
        debug!("initializing mechanism registry");
        Self {
            ticket: ticket::MECHANISM_NAME,
            token: digest_md5::MECHANISM_NAME,
        }
    }

    fn mechanism_for(&self, method: AuthMethod) -> &'static str {
        match method {
            AuthMethod::Ticket => self.ticket,
            AuthMethod::Token => self.token,
        }
    }
}

static REGISTRY: OnceCell<MechanismRegistry> = OnceCell::new();

/// One-time, process-wide initialization of the mechanism table
///
/// Idempotent and safe to invoke concurrently from multiple sessions.
fn registry() -> &'static MechanismRegistry {
    REGISTRY.get_or_init(MechanismRegistry::bootstrap)
}

/// Configure a negotiator for the advertised method
///
/// Fails with [`Error::UnsupportedMethod`] for any method kind other than
/// the two supported, and with [`Error::Initialization`] when the advertised
/// mechanism name is not the one the method's strategy implements.
pub fn configure(
    advertisement: &AuthAdvertisement,
    credential: &Credential,
    pre_encoded: bool,
) -> Result<Negotiator> {
    let method = AuthMethod::parse(&advertisement.method)?;
    let expected = registry().mechanism_for(method);
    if advertisement.mechanism != expected {
        return Err(Error::Initialization(format!(
            "cannot initialize mechanism {}: {:?} authentication uses {}",
            advertisement.mechanism, method, expected
        )));
    }

    match (method, credential) {
        (AuthMethod::Ticket, Credential::Ticket(ticket)) => {
            let properties = ticket_properties(advertisement, ticket, pre_encoded);
            debug!(
                mechanism = %properties.mechanism,
                server = %properties.server_id,
                "configuring ticket authentication"
            );
            Ok(Negotiator::new(Box::new(TicketSession::new(
                &properties,
                ticket,
            )?)))
        }
        (AuthMethod::Token, Credential::Token(token)) => {
            let properties = token_properties(advertisement, token, pre_encoded);
            debug!(
                mechanism = %properties.mechanism,
                server = %properties.server_id,
                "configuring token authentication"
            );
            Ok(Negotiator::new(Box::new(DigestMd5Session::new(
                &properties,
            )?)))
        }
        (AuthMethod::Ticket, Credential::Token(_)) => Err(Error::Authentication(
            "ticket authentication requires a ticket credential".to_string(),
        )),
        (AuthMethod::Token, Credential::Ticket(_)) => Err(Error::Authentication(
            "token authentication requires a token credential".to_string(),
        )),
    }
}

/// Build mechanism properties for the ticket path
///
/// No secret is set: the ticket's own key material stays inside the
/// credential and is never placed on the properties.
fn ticket_properties(
    advertisement: &AuthAdvertisement,
    ticket: &Ticket,
    pre_encoded: bool,
) -> SaslProperties {
    SaslProperties {
        mechanism: advertisement.mechanism.clone(),
        service: advertisement.protocol.clone(),
        server_id: advertisement.server_id.clone(),
        authid: ticket.principal.clone().into_bytes(),
        secret: None,
        pre_encoded,
    }
}

/// Build mechanism properties for the token path
///
/// The secret is always transport-encoded. The identifier is
/// transport-encoded unless it arrived already encoded from an upstream
/// step, in which case it passes through byte-identical.
fn token_properties(
    advertisement: &AuthAdvertisement,
    token: &Token,
    pre_encoded: bool,
) -> SaslProperties {
    let authid = if pre_encoded {
        token.identifier.clone()
    } else {
        codec::transport_encode(&token.identifier).into_bytes()
    };
    SaslProperties {
        mechanism: advertisement.mechanism.clone(),
        service: advertisement.protocol.clone(),
        server_id: advertisement.server_id.clone(),
        authid,
        secret: Some(Zeroizing::new(
            codec::transport_encode(&token.password).into_bytes(),
        )),
        pre_encoded,
    }
}
