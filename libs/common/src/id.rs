use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = quill_common::id::prefixed_ulid("sse");
/// assert!(id.starts_with("sse_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// One open event stream.
    pub const CONNECTION: &str = "sse";
}
