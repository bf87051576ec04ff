//! Fixed responses written back to proxy clients.

pub const SERVER_NAME: &str = "Custom-Enterprise-Proxy/1.0";
pub const REALM: &str = "Enterprise Pre-Auth Proxy";

/// Reply to a successful CONNECT, sent once the upstream is dialed
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Reply to a non-CONNECT request whose target is not `http://...`
pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";

/// Content-Length advertised by the 407 challenge. Sent unchanged for both
/// bodies; neither is actually 97 bytes long.
const CHALLENGE_CONTENT_LENGTH: usize = 97;

/// Why a 407 is being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    /// No `Proxy-Authorization` header
    Required,
    /// Header present but credentials rejected
    InvalidCredentials,
}

impl Challenge {
    fn message(self) -> &'static str {
        match self {
            Challenge::Required => "Authentication required.",
            Challenge::InvalidCredentials => "Invalid credentials.",
        }
    }

    /// Full `407 Proxy Authentication Required` response, head and body.
    pub fn to_bytes(self) -> Vec<u8> {
        format!(
            "HTTP/1.1 407 Proxy Authentication Required\r\n\
             Server: {SERVER_NAME}\r\n\
             Proxy-Authenticate: Basic realm=\"{REALM}\"\r\n\
             Content-Type: text/html\r\n\
             Content-Length: {CHALLENGE_CONTENT_LENGTH}\r\n\
             Connection: close\r\n\
             \r\n\
             <html><body><h1>407 Proxy Authentication Required</h1><p>{}</p></body></html>",
            self.message()
        )
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_required_is_byte_exact() {
        let expected = "HTTP/1.1 407 Proxy Authentication Required\r\n\
Server: Custom-Enterprise-Proxy/1.0\r\n\
Proxy-Authenticate: Basic realm=\"Enterprise Pre-Auth Proxy\"\r\n\
Content-Type: text/html\r\n\
Content-Length: 97\r\n\
Connection: close\r\n\
\r\n\
<html><body><h1>407 Proxy Authentication Required</h1><p>Authentication required.</p></body></html>";
        assert_eq!(Challenge::Required.to_bytes(), expected.as_bytes());
    }

    #[test]
    fn both_challenges_advertise_the_same_length() {
        for challenge in [Challenge::Required, Challenge::InvalidCredentials] {
            let bytes = challenge.to_bytes();
            let text = String::from_utf8(bytes).unwrap();
            assert!(text.contains("\r\nContent-Length: 97\r\n"));
            let body = text.split("\r\n\r\n").nth(1).unwrap();
            assert!(body.contains(challenge.message()));
        }
    }

    #[test]
    fn fixed_status_lines() {
        assert_eq!(
            CONNECTION_ESTABLISHED,
            b"HTTP/1.1 200 Connection Established\r\n\r\n"
        );
        assert_eq!(BAD_REQUEST, b"HTTP/1.1 400 Bad Request\r\n\r\n");
    }
}
