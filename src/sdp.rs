/// Session description carried in an INVITE offer or answer body.
///
/// Full SDP parsing lives outside this layer; only the `o=` line's session
/// version is inspected here, to decide whether a renegotiation actually
/// changed the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdp {
    raw: String,
}

impl Sdp {
    pub fn new(raw: impl Into<String>) -> Self {
        Sdp { raw: raw.into() }
    }

    /// Build from a message body. Empty or non-UTF-8 bodies carry no session
    /// description.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        std::str::from_utf8(body).ok().map(Sdp::new)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The sess-version field of the origin line, when present.
    pub fn origin_version(&self) -> Option<u64> {
        self.raw
            .lines()
            .find_map(|line| line.strip_prefix("o="))
            .and_then(|origin| origin.split_whitespace().nth(2))
            .and_then(|version| version.parse().ok())
    }

    /// Whether `self` describes a newer session than `old`: a higher origin
    /// version when both carry one, any byte difference otherwise.
    pub fn is_new(&self, old: &Sdp) -> bool {
        match (self.origin_version(), old.origin_version()) {
            (Some(new), Some(prev)) => new > prev,
            _ => self.raw != old.raw,
        }
    }
}

impl std::fmt::Display for Sdp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
