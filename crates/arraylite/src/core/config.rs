/// What happens when the `_1`..`_99` suffix search for a duplicate
/// column name is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Keep the duplicate name and log a warning.
    Warn,
    /// Abort the query.
    Error,
}

/// Marshalling options for one session. A snapshot is passed into every
/// bind/materialize call, so a running statement never observes a
/// mid-flight option change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarshalConfig {
    /// Convert text between the host single-byte representation and
    /// UTF-8 on bind and fetch.
    pub convert_utf8: bool,
    /// Wrap array parameters in the self-describing typed envelope
    /// instead of binding their raw bytes.
    pub typed_blobs: bool,
    /// Project SQL NULL as a NaN scalar instead of an empty value.
    pub null_as_nan: bool,
    /// Deduplicate sanitized result column names.
    pub unique_fieldnames: bool,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            convert_utf8: true,
            typed_blobs: false,
            null_as_nan: false,
            unique_fieldnames: true,
            duplicate_policy: DuplicatePolicy::Warn,
        }
    }
}
