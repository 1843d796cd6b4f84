use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// The request path tried to climb above a configured root.
    #[error("Illegal path: {0}")]
    IllegalPath(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed playlist line {line:?}: {reason}")]
    MalformedPlaylistLine { line: String, reason: String },
}

impl CatalogError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CatalogError::NotFound(what.into())
    }

    pub fn malformed_line(line: &str, reason: &str) -> Self {
        CatalogError::MalformedPlaylistLine {
            line: line.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
