use base64::engine::general_purpose;
use base64::Engine;
use std::collections::HashMap;

const BASIC_PREFIX: &str = "Basic ";

/// A username/password pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub username: String,
    pub password: String,
}

impl Auth {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    /// Parse `user:pass`, splitting on the first colon.
    pub fn from_pair(pair: &str) -> Option<Self> {
        let (username, password) = pair.split_once(':')?;
        Some(Self::new(username.to_string(), password.to_string()))
    }
}

/// Static table of accepted credentials, read-only once built
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new<I>(credentials: I) -> Self
    where
        I: IntoIterator<Item = Auth>,
    {
        Self {
            users: credentials
                .into_iter()
                .map(|auth| (auth.username, auth.password))
                .collect(),
        }
    }

    /// Exact match of both username and password
    pub fn validate(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|expected| expected == password)
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Result of checking a `Proxy-Authorization` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No header was sent
    Missing,
    /// A header was sent but did not carry valid credentials
    Invalid,
    /// Credentials matched; carries the username
    Accepted(String),
}

/// Decode a `Basic <base64(user:pass)>` value into its credential pair.
///
/// Returns `None` when the scheme is not `Basic`, the token is not standard
/// base64, the decoded bytes are not UTF-8, or there is no colon.
pub fn decode_basic(value: &str) -> Option<Auth> {
    let token = value.strip_prefix(BASIC_PREFIX)?;
    let decoded = general_purpose::STANDARD.decode(token.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    Auth::from_pair(&text)
}

/// Check the `Proxy-Authorization` value against the credential store.
pub fn authenticate(header: Option<&str>, store: &CredentialStore) -> AuthOutcome {
    let Some(value) = header else {
        return AuthOutcome::Missing;
    };

    match decode_basic(value) {
        Some(auth) if store.validate(&auth.username, &auth.password) => {
            AuthOutcome::Accepted(auth.username)
        }
        _ => AuthOutcome::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::new([Auth::new(
            "enterpriseuser".to_string(),
            "enterprise123".to_string(),
        )])
    }

    fn basic(pair: &str) -> String {
        format!("Basic {}", general_purpose::STANDARD.encode(pair))
    }

    #[test]
    fn validate_requires_exact_match() {
        let store = store();
        assert!(store.validate("enterpriseuser", "enterprise123"));
        assert!(!store.validate("enterpriseuser", "enterprise1234"));
        assert!(!store.validate("EnterpriseUser", "enterprise123"));
        assert!(!store.validate("", ""));
    }

    #[test]
    fn accepts_valid_basic_header() {
        let header = basic("enterpriseuser:enterprise123");
        assert_eq!(header, "Basic ZW50ZXJwcmlzZXVzZXI6ZW50ZXJwcmlzZTEyMw==");
        assert_eq!(
            authenticate(Some(&header), &store()),
            AuthOutcome::Accepted("enterpriseuser".to_string())
        );
    }

    #[test]
    fn missing_header_is_distinct_from_invalid() {
        assert_eq!(authenticate(None, &store()), AuthOutcome::Missing);
    }

    #[test]
    fn rejects_bad_credentials_and_encodings() {
        let store = store();
        let cases = [
            basic("enterpriseuser:wrong"),
            basic("nobody:enterprise123"),
            basic("enterpriseuser"),
            "Basic !!!not-base64!!!".to_string(),
            "Bearer ZW50ZXJwcmlzZXVzZXI6ZW50ZXJwcmlzZTEyMw==".to_string(),
            "basic ZW50ZXJwcmlzZXVzZXI6ZW50ZXJwcmlzZTEyMw==".to_string(),
            format!("Basic {}", general_purpose::STANDARD.encode([0xffu8, 0x3a, 0xfe])),
        ];
        for header in cases {
            assert_eq!(
                authenticate(Some(&header), &store),
                AuthOutcome::Invalid,
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn password_may_contain_colons() {
        let store = CredentialStore::new([Auth::new("u".to_string(), "a:b".to_string())]);
        assert_eq!(
            authenticate(Some(&basic("u:a:b")), &store),
            AuthOutcome::Accepted("u".to_string())
        );
    }

    #[test]
    fn from_pair_splits_on_first_colon() {
        assert_eq!(
            Auth::from_pair("user:pa:ss"),
            Some(Auth::new("user".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(Auth::from_pair("nocolon"), None);
    }
}
