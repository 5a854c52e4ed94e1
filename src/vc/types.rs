//! the page and change data model
//!
//! every value here is synthesized on demand from repository queries; none of
//! it is persisted by the store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{CopySource, LogEntry, PathAction, Revision};

/// suffix of the directory holding a page's attachments
pub const ATTACHMENTS_SUFFIX: &str = "-attachments";

/// A validated wiki page name.
///
/// The name is also the page's repository path; its attachments live under
/// `<name>-attachments/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageReference(String);

impl PageReference {
    const MAX_LEN: usize = 255;

    /// create a PageReference, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_segment(&name, Self::MAX_LEN)?;
        if name.ends_with(ATTACHMENTS_SUFFIX) {
            return Err(InvalidNameError::Reserved(name));
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// the repository path of the page body
    pub fn path(&self) -> &str {
        &self.0
    }

    /// the repository directory holding the page's attachments
    pub fn attachments_path(&self) -> String {
        format!("{}{}", self.0, ATTACHMENTS_SUFFIX)
    }

    /// the repository path of one attachment
    pub fn attachment_path(&self, attachment: &str) -> Result<String, InvalidNameError> {
        validate_segment(attachment, Self::MAX_LEN)?;
        Ok(format!("{}/{}", self.attachments_path(), attachment))
    }

    /// configuration pages are the ones whose name starts with `Config`
    pub fn is_config_page(&self) -> bool {
        self.0.starts_with("Config")
    }
}

impl fmt::Display for PageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PageReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PageReference {
    type Error = InvalidNameError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl From<PageReference> for String {
    fn from(page: PageReference) -> Self {
        page.0
    }
}

impl std::str::FromStr for PageReference {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

fn validate_segment(name: &str, max_len: usize) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }

    if name.len() > max_len {
        return Err(InvalidNameError::TooLong(name.len()));
    }

    if name.starts_with('.') {
        return Err(InvalidNameError::InvalidStart('.'));
    }

    for (i, c) in name.chars().enumerate() {
        if c == '/' || c.is_control() {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }

    Ok(())
}

/// error type for invalid page and attachment names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} bytes", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is reserved for attachments", name),
        }
    }
}

impl std::error::Error for InvalidNameError {}

/// what a changed path holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    Page,
    Attachment,
}

impl StoreKind {
    /// which page a repository path belongs to, and as what
    pub fn classify(path: &str) -> (&str, StoreKind) {
        let marker = format!("{}/", ATTACHMENTS_SUFFIX);
        if let Some(index) = path.find(&marker) {
            return (&path[..index], StoreKind::Attachment);
        }
        match path.strip_suffix(ATTACHMENTS_SUFFIX) {
            Some(page) if !page.is_empty() => (page, StoreKind::Attachment),
            _ => (path, StoreKind::Page),
        }
    }
}

/// the effect one commit had on one path
///
/// only an addition can carry a copy source; a rename shows up as a copying
/// addition at the new path and a deletion at the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Added { copied_from: Option<CopySource> },
    Modified,
    Deleted,
}

impl From<PathAction> for ChangeType {
    fn from(action: PathAction) -> Self {
        match action {
            PathAction::Added { copied_from } => ChangeType::Added { copied_from },
            PathAction::Modified => ChangeType::Modified,
            PathAction::Deleted => ChangeType::Deleted,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Added { copied_from: Some(source) } => write!(f, "added (from {})", source),
            ChangeType::Added { copied_from: None } => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Deleted => write!(f, "deleted"),
        }
    }
}

/// One historical event on one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub path: String,
    /// the page the path belongs to
    pub page: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub revision: Revision,
    pub message: String,
    pub kind: StoreKind,
    pub change_type: ChangeType,
}

impl ChangeInfo {
    pub fn copied_from(&self) -> Option<&CopySource> {
        match &self.change_type {
            ChangeType::Added { copied_from } => copied_from.as_ref(),
            _ => None,
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.change_type == ChangeType::Deleted
    }

    /// the owning page, if its name is still a valid page name
    pub fn page_reference(&self) -> Option<PageReference> {
        PageReference::new(self.page.as_str()).ok()
    }

    /// the attachment's file name, for attachment changes
    pub fn attachment_name(&self) -> Option<&str> {
        match self.kind {
            StoreKind::Attachment => self
                .path
                .rsplit_once('/')
                .map(|(_, name)| name),
            StoreKind::Page => None,
        }
    }
}

impl From<LogEntry> for ChangeInfo {
    fn from(entry: LogEntry) -> Self {
        let (page, kind) = StoreKind::classify(&entry.path);
        let page = page.to_string();
        Self {
            page,
            kind,
            author: entry.author,
            timestamp: entry.timestamp,
            revision: entry.revision,
            message: entry.message,
            change_type: entry.action.into(),
            path: entry.path,
        }
    }
}

/// A page's content as of one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPageInfo {
    pub wiki: String,
    pub page: PageReference,
    pub content: String,
    /// the revision the content last changed in; `None` if the page does not
    /// exist yet
    pub revision: Option<Revision>,
    pub author: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// who holds an editing lock on the page
    pub locked_by: Option<String>,
}

impl VersionedPageInfo {
    /// the placeholder for a page nobody has written yet
    pub fn new_page(wiki: impl Into<String>, page: PageReference) -> Self {
        Self {
            wiki: wiki.into(),
            page,
            content: String::new(),
            revision: None,
            author: None,
            timestamp: None,
            locked_by: None,
        }
    }

    pub fn is_new_page(&self) -> bool {
        self.revision.is_none()
    }
}

/// every version of one attachment, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentHistory {
    pub name: String,
    pub versions: Vec<ChangeInfo>,
    pub deleted: bool,
}

impl AttachmentHistory {
    pub fn latest(&self) -> Option<&ChangeInfo> {
        self.versions.first()
    }
}
