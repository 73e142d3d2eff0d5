//! DIGEST-MD5 client mechanism
//!
//! This module implements the client side of the DIGEST-MD5 challenge/
//! response computation (RFC 2831) as used for token authentication:
//! qop=auth with the md5-sess algorithm. Confidentiality is carried by the
//! separately negotiated cipher session, not by a SASL security layer.

use crate::auth::mechanism::{Mechanism, Step};
use crate::auth::SaslProperties;
use crate::error::{Error, Result};
use bitflags::bitflags;
use md5::{Digest, Md5};
use rand::RngCore;
use zeroize::Zeroizing;

/// Mechanism name as advertised on the wire
pub const MECHANISM_NAME: &str = "DIGEST-MD5";

/// Nonce count for the first (and only) authentication on a session
const NC_FIRST: &str = "00000001";

bitflags! {
    /// Quality-of-protection options offered in a challenge
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QopFlags: u8 {
        /// Authentication only
        const AUTH = 0x01;
        /// Authentication with integrity protection
        const AUTH_INT = 0x02;
        /// Authentication with integrity and confidentiality
        const AUTH_CONF = 0x04;
    }
}

impl QopFlags {
    /// Parse a qop directive value, ignoring unknown options
    fn parse(value: &str) -> Self {
        let mut flags = QopFlags::empty();
        for option in value.split(',') {
            match option.trim() {
                "auth" => flags |= QopFlags::AUTH,
                "auth-int" => flags |= QopFlags::AUTH_INT,
                "auth-conf" => flags |= QopFlags::AUTH_CONF,
                _ => {}
            }
        }
        flags
    }
}

/// DIGEST-MD5 client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestState {
    Initial,
    ResponseSent,
    Complete,
}

/// DIGEST-MD5 client session
pub struct DigestMd5Session {
    username: String,
    password: Zeroizing<String>,
    service: String,
    server_id: String,
    cnonce: String,
    state: DigestState,
    expected_rspauth: Option<String>,
}

impl DigestMd5Session {
    /// Create a session from configured properties
    pub fn new(properties: &SaslProperties) -> Result<Self> {
        Self::with_cnonce(properties, generate_cnonce())
    }

    fn with_cnonce(properties: &SaslProperties, cnonce: String) -> Result<Self> {
        let username = String::from_utf8(properties.authid.clone()).map_err(|_| {
            Error::Authentication("token identifier is not valid text".to_string())
        })?;
        let secret = properties.secret.as_ref().ok_or_else(|| {
            Error::Authentication("token authentication requires a secret".to_string())
        })?;
        let password = String::from_utf8(secret.to_vec())
            .map_err(|_| Error::Authentication("token secret is not valid text".to_string()))?;

        Ok(Self {
            username,
            password: Zeroizing::new(password),
            service: properties.service.clone(),
            server_id: properties.server_id.clone(),
            cnonce,
            state: DigestState::Initial,
            expected_rspauth: None,
        })
    }

    fn digest_uri(&self) -> String {
        format!("{}/{}", self.service, self.server_id)
    }

    /// Process the server's initial challenge and build the digest response
    fn respond_to_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let text = std::str::from_utf8(challenge)
            .map_err(|_| Error::Authentication("challenge is not valid text".to_string()))?;
        let directives = parse_directives(text)?;

        let nonce = directive_value(&directives, "nonce").ok_or_else(|| {
            Error::Authentication("challenge is missing a nonce directive".to_string())
        })?;
        let realm = directive_value(&directives, "realm").unwrap_or_default();
        // qop defaults to auth when the server offers nothing.
        let offered = directive_value(&directives, "qop")
            .map(|value| QopFlags::parse(&value))
            .unwrap_or(QopFlags::AUTH);
        if !offered.contains(QopFlags::AUTH) {
            return Err(Error::Authentication(format!(
                "peer offers no supported protection level: {:?}",
                offered
            )));
        }

        let digest_uri = self.digest_uri();
        let response = response_value(
            &self.username,
            &realm,
            &self.password,
            &nonce,
            &self.cnonce,
            NC_FIRST,
            "auth",
            &format!("AUTHENTICATE:{}", digest_uri),
        );
        self.expected_rspauth = Some(response_value(
            &self.username,
            &realm,
            &self.password,
            &nonce,
            &self.cnonce,
            NC_FIRST,
            "auth",
            &format!(":{}", digest_uri),
        ));

        let payload = format!(
            "charset=utf-8,username=\"{}\",realm=\"{}\",nonce=\"{}\",nc={},cnonce=\"{}\",digest-uri=\"{}\",response={},qop=auth",
            quote(&self.username),
            quote(&realm),
            quote(&nonce),
            NC_FIRST,
            quote(&self.cnonce),
            quote(&digest_uri),
            response,
        );
        Ok(payload.into_bytes())
    }

    /// Verify the server's mutual-authentication response
    fn verify_rspauth(&mut self, challenge: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(challenge)
            .map_err(|_| Error::Authentication("challenge is not valid text".to_string()))?;
        let directives = parse_directives(text)?;
        let rspauth = directive_value(&directives, "rspauth").ok_or_else(|| {
            Error::Authentication("final challenge is missing rspauth".to_string())
        })?;

        let expected = self
            .expected_rspauth
            .take()
            .ok_or_else(|| Error::Authentication("no pending response to verify".to_string()))?;
        if rspauth != expected {
            return Err(Error::Authentication(
                "server authentication response mismatch".to_string(),
            ));
        }
        Ok(())
    }
}

impl Mechanism for DigestMd5Session {
    fn name(&self) -> &'static str {
        MECHANISM_NAME
    }

    fn step(&mut self, challenge: &[u8]) -> Result<Step> {
        match self.state {
            DigestState::Initial => {
                let response = self.respond_to_challenge(challenge)?;
                self.state = DigestState::ResponseSent;
                Ok(Step::Continue(response))
            }
            DigestState::ResponseSent => {
                self.verify_rspauth(challenge)?;
                self.state = DigestState::Complete;
                Ok(Step::Finished(Vec::new()))
            }
            DigestState::Complete => Err(Error::Authentication(
                "mechanism already completed".to_string(),
            )),
        }
    }
}

/// Raw MD5 digest
fn h(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// md5-sess A1: H(H(username:realm:password):nonce:cnonce)
fn a1(username: &str, realm: &str, password: &str, nonce: &str, cnonce: &str) -> [u8; 16] {
    let inner = h(format!("{}:{}:{}", username, realm, password).as_bytes());
    let mut buf = Vec::with_capacity(inner.len() + nonce.len() + cnonce.len() + 2);
    buf.extend_from_slice(&inner);
    buf.extend_from_slice(format!(":{}:{}", nonce, cnonce).as_bytes());
    h(&buf)
}

/// Hex-encoded response value for the given A2 string
///
/// `a2` is `AUTHENTICATE:digest-uri` for the client response and
/// `:digest-uri` for the server's rspauth.
#[allow(clippy::too_many_arguments)]
pub(crate) fn response_value(
    username: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    cnonce: &str,
    nc: &str,
    qop: &str,
    a2: &str,
) -> String {
    let ha1 = hex::encode(a1(username, realm, password, nonce, cnonce));
    let ha2 = hex::encode(h(a2.as_bytes()));
    hex::encode(h(
        format!("{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, qop, ha2).as_bytes(),
    ))
}

/// Generate a random client nonce
fn generate_cnonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Backslash-escape quote and backslash for a quoted directive value
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Parse a comma-separated directive list into (key, unquoted value) pairs
///
/// Quoted values may contain commas and backslash escapes. Malformed input
/// is an authentication failure, never a panic.
pub(crate) fn parse_directives(input: &str) -> Result<Vec<(String, String)>> {
    let mut directives = Vec::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let eq = rest.find('=').ok_or_else(|| {
            Error::Authentication(format!("malformed challenge directive: {}", rest))
        })?;
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];

        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            let mut out = String::new();
            let mut chars = quoted.char_indices();
            let mut end = None;
            while let Some((index, ch)) = chars.next() {
                match ch {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            out.push(escaped);
                        }
                    }
                    '"' => {
                        end = Some(index);
                        break;
                    }
                    _ => out.push(ch),
                }
            }
            let end = end.ok_or_else(|| {
                Error::Authentication("unterminated quoted directive value".to_string())
            })?;
            value = out;
            rest = quoted[end + 1..].trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = rest[end..].strip_prefix(',').unwrap_or("").trim_start();
        }

        directives.push((key, value));
    }

    Ok(directives)
}

pub(crate) fn directive_value(directives: &[(String, String)], key: &str) -> Option<String> {
    directives
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.clone())
}
