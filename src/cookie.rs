//! The `prompt-id` session cookie.
//!
//! [`PromptCookie`] wraps a [`PromptTokenCodec`] and a [`CookieStore`]. Mutation
//! failures are swallowed: a store may be read-only (e.g. while rendering) and
//! expiry is enforced on the read path regardless.

use std::collections::HashMap;
use std::fmt;

use crate::config::Settings;
use crate::error::{ConfigError, CookieError};
use crate::signing::{now_millis, PromptTokenCodec, TokenState};

pub const PROMPT_COOKIE_NAME: &str = "prompt-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// An outgoing cookie with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub max_age_secs: u64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl SetCookie {
    /// A cookie that tells the client to drop `name` immediately.
    pub fn removal(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            path: "/".to_string(),
            max_age_secs: 0,
            http_only: true,
            secure,
            same_site: SameSite::Lax,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.max_age_secs == 0
    }

    /// Value for a `Set-Cookie` response header.
    pub fn header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path={}; Max-Age={}",
            self.name, self.value, self.path, self.max_age_secs
        )?;
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        write!(f, "; SameSite={}", self.same_site.as_str())
    }
}

/// Request/response cookie access for one request context.
pub trait CookieStore {
    fn get(&self, name: &str) -> Option<String>;

    fn set(&mut self, cookie: SetCookie) -> Result<(), CookieError>;

    fn remove(&mut self, name: &str, secure: bool) -> Result<(), CookieError>;
}

/// Cookie store backed by a request `Cookie` header, collecting `Set-Cookie` output.
#[derive(Debug, Clone, Default)]
pub struct HeaderCookieJar {
    values: HashMap<String, String>,
    outgoing: Vec<SetCookie>,
    read_only: bool,
}

impl HeaderCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` request header (`name1=value1; name2=value2`).
    pub fn from_header(header: &str) -> Self {
        let values = header
            .split(';')
            .filter_map(|part| {
                let (name, value) = part.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self {
            values,
            ..Self::default()
        }
    }

    /// Refuse all mutations from now on.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn outgoing(&self) -> &[SetCookie] {
        &self.outgoing
    }

    /// Rendered `Set-Cookie` header values, in the order they were produced.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.outgoing.iter().map(SetCookie::header_value).collect()
    }
}

impl CookieStore for HeaderCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).filter(|v| !v.is_empty()).cloned()
    }

    fn set(&mut self, cookie: SetCookie) -> Result<(), CookieError> {
        if self.read_only {
            return Err(CookieError::ReadOnly);
        }
        if cookie.is_removal() {
            self.values.remove(&cookie.name);
        } else {
            self.values.insert(cookie.name.clone(), cookie.value.clone());
        }
        self.outgoing.push(cookie);
        Ok(())
    }

    fn remove(&mut self, name: &str, secure: bool) -> Result<(), CookieError> {
        self.set(SetCookie::removal(name, secure))
    }
}

/// Mint, read and clear the signed `prompt-id` cookie.
#[derive(Debug, Clone)]
pub struct PromptCookie {
    codec: PromptTokenCodec,
    secure: bool,
}

impl PromptCookie {
    pub fn new(codec: PromptTokenCodec, secure: bool) -> Self {
        Self { codec, secure }
    }

    /// Fails when no cookie secret is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self::new(
            PromptTokenCodec::from_settings(settings)?,
            settings.production,
        ))
    }

    pub fn codec(&self) -> &PromptTokenCodec {
        &self.codec
    }

    /// Mint a token for `prompt_id` and store it. Returns the token either way.
    pub fn set<S: CookieStore + ?Sized>(&self, store: &mut S, prompt_id: &str) -> String {
        self.set_at(store, prompt_id, now_millis())
    }

    pub fn set_at<S: CookieStore + ?Sized>(
        &self,
        store: &mut S,
        prompt_id: &str,
        now_ms: u64,
    ) -> String {
        let ttl_secs = self.codec.ttl_secs();
        let token = self.codec.mint_at(prompt_id, ttl_secs, now_ms);
        let cookie = SetCookie {
            name: PROMPT_COOKIE_NAME.to_string(),
            value: token.clone(),
            path: "/".to_string(),
            max_age_secs: ttl_secs,
            http_only: true,
            secure: self.secure,
            same_site: SameSite::Lax,
        };
        if let Err(err) = store.set(cookie) {
            tracing::debug!(error = %err, "prompt cookie not stored");
        }
        token
    }

    /// The prompt id carried by a valid cookie. Expired cookies are cleared.
    pub fn read<S: CookieStore + ?Sized>(&self, store: &mut S) -> Option<String> {
        self.read_at(store, now_millis())
    }

    pub fn read_at<S: CookieStore + ?Sized>(&self, store: &mut S, now_ms: u64) -> Option<String> {
        let raw = store.get(PROMPT_COOKIE_NAME)?;
        match self.codec.check_at(&raw, now_ms) {
            TokenState::Valid(payload) => Some(payload.prompt_id),
            TokenState::Expired(payload) => {
                tracing::debug!(prompt_id = %payload.prompt_id, "prompt cookie expired");
                self.clear(store);
                None
            }
            TokenState::Invalid => None,
        }
    }

    pub fn clear<S: CookieStore + ?Sized>(&self, store: &mut S) {
        if let Err(err) = store.remove(PROMPT_COOKIE_NAME, self.secure) {
            tracing::debug!(error = %err, "prompt cookie not cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn prompt_cookie(secure: bool) -> PromptCookie {
        PromptCookie::new(PromptTokenCodec::new("cookie-secret").unwrap(), secure)
    }

    #[test]
    fn parses_cookie_header() {
        let jar = HeaderCookieJar::from_header("theme=dark; prompt-id=abc.def ;empty=; =bad");
        assert_eq!(jar.get("theme").as_deref(), Some("dark"));
        assert_eq!(jar.get("prompt-id").as_deref(), Some("abc.def"));
        assert_eq!(jar.get("empty"), None);
        assert_eq!(jar.get("missing"), None);
    }

    #[test]
    fn set_renders_attributes() {
        let mut jar = HeaderCookieJar::new();
        let token = prompt_cookie(true).set_at(&mut jar, "p1", NOW);
        let headers = jar.set_cookie_headers();
        assert_eq!(
            headers,
            vec![format!(
                "prompt-id={token}; Path=/; Max-Age=604800; HttpOnly; Secure; SameSite=Lax"
            )]
        );
    }

    #[test]
    fn insecure_outside_production() {
        let mut jar = HeaderCookieJar::new();
        prompt_cookie(false).set_at(&mut jar, "p1", NOW);
        assert!(!jar.set_cookie_headers()[0].contains("Secure"));
    }

    #[test]
    fn read_returns_prompt_id() {
        let cookie = prompt_cookie(false);
        let mut jar = HeaderCookieJar::new();
        cookie.set_at(&mut jar, "p1", NOW);
        assert_eq!(cookie.read_at(&mut jar, NOW + 10).as_deref(), Some("p1"));
    }

    #[test]
    fn expired_cookie_is_cleared() {
        let cookie = PromptCookie::new(
            PromptTokenCodec::new("cookie-secret").unwrap().with_ttl(1),
            false,
        );
        let token = cookie.codec().mint_at("p1", 1, NOW);
        let mut jar = HeaderCookieJar::from_header(&format!("prompt-id={token}"));

        assert_eq!(cookie.read_at(&mut jar, NOW + 1_000), None);
        assert_eq!(
            jar.set_cookie_headers(),
            vec!["prompt-id=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax".to_string()]
        );
        assert_eq!(jar.get(PROMPT_COOKIE_NAME), None);
    }

    #[test]
    fn tampered_cookie_reads_as_none_without_clearing() {
        let cookie = prompt_cookie(false);
        let mut jar = HeaderCookieJar::from_header("prompt-id=forged.value");
        assert_eq!(cookie.read_at(&mut jar, NOW), None);
        assert!(jar.outgoing().is_empty());
    }

    #[test]
    fn read_only_store_swallows_mutations() {
        let cookie = prompt_cookie(false);
        let token = cookie.codec().mint_at("p1", 1, NOW);
        let mut jar = HeaderCookieJar::from_header(&format!("prompt-id={token}")).read_only();

        assert_eq!(cookie.read_at(&mut jar, NOW + 2_000), None);
        cookie.clear(&mut jar);
        let minted = cookie.set_at(&mut jar, "p2", NOW);
        assert!(!minted.is_empty());
        assert!(jar.outgoing().is_empty());
    }

    #[test]
    fn clear_removes_value() {
        let cookie = prompt_cookie(false);
        let mut jar = HeaderCookieJar::new();
        cookie.set_at(&mut jar, "p1", NOW);
        cookie.clear(&mut jar);
        assert_eq!(cookie.read_at(&mut jar, NOW), None);
        assert_eq!(jar.outgoing().len(), 2);
        assert!(jar.outgoing()[1].is_removal());
    }
}
