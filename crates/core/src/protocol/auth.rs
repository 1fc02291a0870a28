//! RTSP client authentication (RFC 2326 §12.5, RFC 2617).
//!
//! A 401 response to ANNOUNCE carries a `WWW-Authenticate` challenge. When
//! it names both a realm and a nonce the client answers with Digest,
//! otherwise with Basic. The chosen scheme is kept in [`AuthState`] and
//! every later request of the session carries a matching `Authorization`
//! header.

use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::Method;
use super::response::RtspResponse;

/// User name and password for servers that require authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Realm and nonce offered by a Digest challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: String,
}

impl AuthChallenge {
    /// Extract `realm` and `nonce` from a 401 response.
    ///
    /// `WWW-Authenticate` headers are checked first; servers that fold the
    /// challenge oddly are handled by scanning the raw response head.
    pub fn from_response(response: &RtspResponse) -> Option<Self> {
        response
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("WWW-Authenticate"))
            .find_map(|(_, value)| Self::parse(value))
            .or_else(|| Self::parse(&response.raw))
    }

    /// Parse a challenge string such as
    /// `Digest realm="Streaming Server", nonce="a1b2c3"`.
    pub fn parse(text: &str) -> Option<Self> {
        let realm = quoted_param(text, "realm")?;
        let nonce = quoted_param(text, "nonce")?;
        Some(Self { realm, nonce })
    }
}

/// Value of `name="..."`, matched case-insensitively on the name.
fn quoted_param(text: &str, name: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let needle = format!("{}=\"", name);
    let mut from = 0;
    while let Some(found) = lower[from..].find(&needle) {
        let at = from + found;
        // Reject matches inside a longer name, e.g. `xrealm=`.
        let boundary = at == 0 || !lower.as_bytes()[at - 1].is_ascii_alphanumeric();
        let start = at + needle.len();
        if boundary {
            let end = text[start..].find('"')? + start;
            return Some(text[start..end].to_string());
        }
        from = start;
    }
    None
}

/// `MD5(MD5(user:realm:pass):nonce:MD5(method:uri))`, lowercase hex.
pub fn digest_response(
    credentials: &Credentials,
    challenge: &AuthChallenge,
    method: Method,
    uri: &str,
) -> String {
    let ha1 = md5::compute(format!(
        "{}:{}:{}",
        credentials.username, challenge.realm, credentials.password
    ));
    let ha2 = md5::compute(format!("{}:{}", method, uri));
    let response = md5::compute(format!("{:x}:{}:{:x}", ha1, challenge.nonce, ha2));
    format!("{:x}", response)
}

/// Authentication negotiated for the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    None,
    Basic,
    Digest(AuthChallenge),
}

impl AuthState {
    /// Pick Digest when the 401 offered realm and nonce, Basic otherwise.
    pub fn from_challenge(response: &RtspResponse) -> Self {
        match AuthChallenge::from_response(response) {
            Some(challenge) => AuthState::Digest(challenge),
            None => AuthState::Basic,
        }
    }

    /// `Authorization` header value for `method` on `uri`, if any scheme is active.
    pub fn authorization(
        &self,
        credentials: Option<&Credentials>,
        method: Method,
        uri: &str,
    ) -> Option<String> {
        let credentials = credentials?;
        match self {
            AuthState::None => None,
            AuthState::Basic => {
                let token = BASE64_STANDARD
                    .encode(format!("{}:{}", credentials.username, credentials.password));
                Some(format!("Basic {}", token))
            }
            AuthState::Digest(challenge) => {
                let response = digest_response(credentials, challenge, method, uri);
                Some(format!(
                    "Digest username=\"{}\",realm=\"{}\",nonce=\"{}\",uri=\"{}\",response=\"{}\"",
                    credentials.username, challenge.realm, challenge.nonce, uri, response
                ))
            }
        }
    }
}
