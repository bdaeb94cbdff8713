//! Topic-string helpers shared by both sides of a connection.
//!
//! Topics are paths split on a two-character delimiter (`::`). A pattern may
//! use `*` to match exactly one segment, or a trailing `**` to match zero or
//! more segments. A topic that crosses the wire is qualified with the
//! originating peer's name as its first segment.

/// The segment delimiter.
pub const DELIMITER: &str = "::";

/// Matches exactly one segment when used in a listener pattern.
pub const WILDCARD: &str = "*";

/// Matches zero or more trailing segments and terminates the pattern.
pub const DEEP_WILDCARD: &str = "**";

/// Splits a topic into its segments.
pub fn split(topic: &str) -> Vec<&str> {
    topic.split(DELIMITER).collect()
}

/// Joins segments back into a topic string.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

/// Prefixes a topic with its originating peer name.
pub fn qualify(origin: &str, topic: &str) -> String {
    format!("{origin}{DELIMITER}{topic}")
}

/// Returns the first segment of a topic.
pub fn first_segment(topic: &str) -> &str {
    topic.split(DELIMITER).next().unwrap_or(topic)
}
