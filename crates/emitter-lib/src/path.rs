//! Metric path construction and encoding
//!
//! A pushed sample's identity is a flat key/value map rendered into the
//! sink URL as `key/value` segment pairs. Segment order is observable:
//! the sink routes on the rendered path, so the map preserves insertion
//! order. Literal `.`, `/` and `-` are structure to the sink's router
//! and must never appear raw inside a segment.

/// Label keys that are never encoded into metric paths
const RESERVED_LABEL_KEYS: [&str; 5] = [
    "pod-template-hash",
    "k8s-app",
    "controller-uid",
    "controller-revision-hash",
    "pod-template-generation",
];

/// Characters that disqualify a key outright
const INVALID_KEY_CHARS: &[char] = &['.', '/', '-'];

/// Whether a label/annotation key may appear in a metric path
///
/// Rejects the well-known controller-injected label names and any key
/// containing a character the path router treats as structure. Total
/// over arbitrary input; rejection is reported, not an error.
pub fn is_valid_key(key: &str) -> bool {
    !RESERVED_LABEL_KEYS.contains(&key) && !key.contains(INVALID_KEY_CHARS)
}

/// An insertion-ordered string map for metric path dimensions
///
/// Backed by a plain vector: paths hold tens of entries at most, and a
/// vector keeps the ordering contract trivially correct. Inserting an
/// existing key overwrites its value in place, keeping the original
/// position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathMap {
    entries: Vec<(String, String)>,
}

impl PathMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base path for one pod: the four reserved identity keys, in the
    /// order the sink expects them
    pub fn for_pod(namespace: &str, pod_name: &str) -> Self {
        let mut path = Self::new();
        path.insert("kubernetes_namespace", namespace);
        path.insert("kubernetes_pod_name", pod_name);
        path.insert("pod", pod_name);
        path.insert("namespace", namespace);
        path
    }

    /// Insert or overwrite a key. Overwrites keep the key's original
    /// position in the path.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether a segment can be emitted verbatim: non-empty ASCII
/// alphanumerics once leading/trailing underscores are stripped
fn is_safe_segment(s: &str) -> bool {
    let trimmed = s.trim_matches('_');
    !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_alphanumeric())
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Percent-encode a segment for the sink's path router
///
/// ASCII alphanumerics, `_` and `~` pass through; every other byte of
/// the UTF-8 form becomes `%XX`. Unlike a stock URL encoding this also
/// covers `.` and `-`, which the router would otherwise interpret.
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'~' {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
            out.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
        }
    }
    out
}

/// Encode one key/value pair into its path segment form
///
/// Safe pairs stay human-readable as `key/value`. An empty value gets
/// an explicit `@base64/=` marker after the encoded key, so the path
/// never contains an ambiguous empty segment. Everything else is
/// percent-encoded on both sides.
pub fn encode_segment(key: &str, value: &str) -> String {
    if is_safe_segment(key) && is_safe_segment(value) {
        return format!("{}/{}", key, value);
    }
    if value.is_empty() {
        return format!("{}@base64/=", percent_encode(key));
    }
    format!("{}/{}", percent_encode(key), percent_encode(value))
}

/// Render a whole path map, segments joined with `/` in insertion order
pub fn encode_path(path: &PathMap) -> String {
    path.iter()
        .map(|(key, value)| encode_segment(key, value))
        .collect::<Vec<_>>()
        .join("/")
}
