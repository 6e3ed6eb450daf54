//! Type-safe resource identifiers for databases and documents.

use snafu::Snafu;

/// Errors that can occur when parsing resource names.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum NameError {
    #[snafu(display(
        "invalid database id: '{id}' - must be at least 1 character long and contain only letters, numbers, hyphens, and underscores"
    ))]
    InvalidDatabaseId { id: String },
    #[snafu(display(
        "invalid document path: '{path}' - expected an even number of non-empty '/'-separated segments"
    ))]
    InvalidDocumentPath { path: String },
}

pub type NameResult<T, E = NameError> = ::std::result::Result<T, E>;

fn validate_database_id(id: &str) -> NameResult<()> {
    if id.is_empty() {
        return Err(NameError::InvalidDatabaseId { id: id.to_string() });
    }

    for ch in id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '-' && ch != '_' {
            return Err(NameError::InvalidDatabaseId { id: id.to_string() });
        }
    }

    Ok(())
}

fn validate_document_path(path: &str) -> NameResult<()> {
    let segments: Vec<&str> = path.split('/').collect();

    // Document paths alternate collection and document ids, so a valid path
    // always has an even, non-zero number of segments.
    if segments.len() < 2 || segments.len() % 2 != 0 {
        return Err(NameError::InvalidDocumentPath {
            path: path.to_string(),
        });
    }

    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(NameError::InvalidDocumentPath {
            path: path.to_string(),
        });
    }

    Ok(())
}

/// Type-safe identifier for a database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseName {
    id: String,
}

impl DatabaseName {
    /// Create a new database identifier.
    pub fn new(id: impl Into<String>) -> NameResult<Self> {
        let id = id.into();
        validate_database_id(&id)?;
        Ok(Self { id })
    }

    /// Create a new database identifier without validation.
    ///
    /// # Panics
    ///
    /// Panics if the database id is invalid.
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        let id = id.into();
        validate_database_id(&id).expect("database id must be valid");
        Self { id }
    }

    /// Get the database id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl std::str::FromStr for DatabaseName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Type-safe identifier for a document.
///
/// A document name is a `/`-separated path alternating collection and
/// document ids, e.g. `users/alice` or `users/alice/orders/1234`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentName {
    path: String,
}

impl DocumentName {
    /// Create a new document identifier.
    pub fn new(path: impl Into<String>) -> NameResult<Self> {
        let path = path.into();
        validate_document_path(&path)?;
        Ok(Self { path })
    }

    /// Create a new document identifier without validation.
    ///
    /// # Panics
    ///
    /// Panics if the document path is invalid.
    pub fn new_unchecked(path: impl Into<String>) -> Self {
        let path = path.into();
        validate_document_path(&path).expect("document path must be valid");
        Self { path }
    }

    /// Get the full document path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the document id, the last segment of the path.
    pub fn id(&self) -> &str {
        self.path
            .rsplit('/')
            .next()
            .expect("document path has at least two segments")
    }

    /// Get the parent collection path.
    pub fn collection(&self) -> &str {
        let (collection, _) = self
            .path
            .rsplit_once('/')
            .expect("document path has at least two segments");
        collection
    }
}

impl std::fmt::Display for DocumentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl std::str::FromStr for DocumentName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
