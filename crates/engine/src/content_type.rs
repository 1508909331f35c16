//! File name to MIME type resolution.

/// Guess the content type of a file from its name (extension).
///
/// Returns [`None`] when the type cannot be guessed; the caller decides
/// whether such a file is uploaded without a type or skipped.
pub fn resolve(file_name: &str) -> Option<&'static str> {
    mime_guess::from_path(file_name).first_raw()
}
