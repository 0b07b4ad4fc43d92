//! HTTP traffic heuristic.
//!
//! Matches fixed byte positions only: the first four bytes against a set of
//! request-method prefixes, or the `HTTP/x.y` status-line shape. This is not a
//! parser. Binary data that happens to start with `POST` is accepted; requests
//! split across syscalls, or using methods outside the table, are not.

/// Leading four bytes of the request methods we recognise.
///
/// `DELETE`, `PATCH` and `OPTIONS` are matched on their first four letters
/// only. `GET ` and `PUT ` include the separating space.
const REQUEST_PREFIXES: [[u8; 4]; 7] = [
    *b"GET ",
    *b"POST",
    *b"PUT ",
    *b"DELE",
    *b"HEAD",
    *b"PATC",
    *b"OPTI",
];

const MIN_REQUEST_LEN: usize = 4;
const MIN_RESPONSE_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Starts with a known request-method prefix
    Request,
    /// Starts with `HTTP/?.`
    Response,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Request => "request",
            Classification::Response => "response",
        }
    }
}

/// Classify the first `len` bytes of `data`.
///
/// `len` is clamped to `data.len()`.
#[inline(always)]
pub fn classify(data: &[u8], len: usize) -> Option<Classification> {
    let len = if len < data.len() { len } else { data.len() };
    if len < MIN_REQUEST_LEN {
        return None;
    }

    let head = [data[0], data[1], data[2], data[3]];
    for prefix in REQUEST_PREFIXES.iter() {
        if *prefix == head {
            return Some(Classification::Request);
        }
    }

    // Status line: "HTTP/" major "." minor. The major digit (byte 5) is not checked.
    if len >= MIN_RESPONSE_LEN && head == *b"HTTP" && data[4] == b'/' && data[6] == b'.' {
        return Some(Classification::Response);
    }

    None
}

/// True when the first `len` bytes of `data` look like HTTP.
#[inline(always)]
pub fn looks_like_http(data: &[u8], len: usize) -> bool {
    classify(data, len).is_some()
}
