use bytes::Bytes;

/// Errors raised while interpreting the bytes a client sent
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty request")]
    Empty,

    #[error("request is not valid UTF-8")]
    Encoding,

    #[error("malformed request line: {0:?}")]
    RequestLine(String),

    #[error("malformed target: {0:?}")]
    Target(String),
}

/// `METHOD target VERSION`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub version: Option<String>,
}

impl RequestLine {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(method), Some(target)) => Ok(Self {
                method: method.to_string(),
                target: target.to_string(),
                version: parts.next().map(str::to_string),
            }),
            _ => Err(ParseError::RequestLine(line.to_string())),
        }
    }

    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }
}

/// A request as captured from a single read of the client socket.
///
/// The raw bytes are kept untouched so plain HTTP requests can be replayed
/// to the upstream verbatim.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    raw: Bytes,
    request_line: String,
    /// Every line after the request line, body lines included
    lines: Vec<String>,
}

impl ProxyRequest {
    pub fn parse(raw: Bytes) -> Result<Self, ParseError> {
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }
        let text = std::str::from_utf8(&raw).map_err(|_| ParseError::Encoding)?;

        let mut lines = text.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let lines = lines.map(str::to_string).collect();

        Ok(Self {
            raw,
            request_line,
            lines,
        })
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn request_line(&self) -> &str {
        &self.request_line
    }

    /// Header lines in the order received, duplicates included
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .take_while(|line| !line.is_empty())
    }

    /// Value of the first line starting with `proxy-authorization:` (any
    /// case), trimmed. Every line after the request line is searched, not
    /// only the header block. An empty value is treated as absent.
    pub fn proxy_authorization(&self) -> Option<&str> {
        const PREFIX: &str = "proxy-authorization:";
        self.lines.iter().find_map(|line| {
            let name = line.get(..PREFIX.len())?;
            if !name.eq_ignore_ascii_case(PREFIX) {
                return None;
            }
            Some(line[PREFIX.len()..].trim()).filter(|v| !v.is_empty())
        })
    }
}
