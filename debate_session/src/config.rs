// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// A reference to the bytes of a file, as handed over by a file picker or a
/// drag-and-drop payload.
///
/// Only the name, the size and the MIME type are ever read.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct FileHandle {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl FileHandle {
    pub fn new(name: &str, size: u64, mime_type: &str) -> FileHandle {
        FileHandle {
            name: name.to_string(),
            size,
            mime_type: mime_type.to_string(),
        }
    }
}

/// The coarse kind of a file, derived once at admission.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum MimeClass {
    Audio,
    Video,
    Text,
    Other,
}

// The document formats accepted by the upload area besides audio and video.
const TEXT_MIME_TYPES: [&str; 3] = [
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/rtf",
];

const TEXT_EXTENSIONS: [&str; 4] = ["txt", "doc", "docx", "rtf"];

impl MimeClass {
    pub fn from_mime(mime_type: &str) -> MimeClass {
        let mt = mime_type.trim().to_ascii_lowercase();
        if mt.starts_with("audio/") {
            MimeClass::Audio
        } else if mt.starts_with("video/") {
            MimeClass::Video
        } else if mt.starts_with("text/") || TEXT_MIME_TYPES.contains(&mt.as_str()) {
            MimeClass::Text
        } else {
            MimeClass::Other
        }
    }

    /// Classifies by MIME type, then by the extension of the name when the
    /// type is empty or unknown.
    pub fn from_file(file: &FileHandle) -> MimeClass {
        match MimeClass::from_mime(&file.mime_type) {
            MimeClass::Other => {
                let ext = file
                    .name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .unwrap_or_default();
                if TEXT_EXTENSIONS.contains(&ext.as_str()) {
                    MimeClass::Text
                } else {
                    MimeClass::Other
                }
            }
            class => class,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MimeClass::Audio => "audio",
            MimeClass::Video => "video",
            MimeClass::Text => "text",
            MimeClass::Other => "other",
        }
    }
}

// ******** Upload data structures *********

/// Identifier of an upload item, unique within one pipeline.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct UploadId(pub u64);

impl Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upload-{:04}", self.0)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum UploadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::InProgress => "inProgress",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UploadItem {
    pub id: UploadId,
    pub file: FileHandle,
    pub name: String,
    pub size_bytes: u64,
    pub mime_class: MimeClass,
    pub status: UploadStatus,
    /// Only moves forward. A completed item reports 100, a failed item keeps
    /// the last value reached.
    pub percent_complete: u8,
    pub failure: Option<String>,
}

/// What an upload transport reports for the item it is carrying.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TransportReport {
    /// The overall percentage reached so far, in [0, 100].
    Progress(u8),
    Failed(String),
}

/// Notifications published by the pipeline on every observable change.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum UploadEvent {
    Admitted(UploadId),
    Started(UploadId),
    Progress(UploadId, u8),
    Completed(UploadId),
    Failed(UploadId, String),
    Removed(UploadId),
}

// ******** Voting data structures *********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PollOption {
    pub id: String,
    pub label: String,
    pub votes: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SessionStatus {
    Open,
    Committed,
    Closed,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Committed => "committed",
            SessionStatus::Closed => "closed",
        }
    }
}

/// Why a commit was turned down without an error.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RejectReason {
    AlreadyCommitted,
    Closed,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CommitOutcome {
    Accepted,
    /// The vote was counted locally but the vote transport refused it.
    /// The tally is kept and a session notice is raised.
    AcceptedUnconfirmed(String),
    Rejected(RejectReason),
}

impl CommitOutcome {
    pub fn is_counted(&self) -> bool {
        matches!(
            self,
            CommitOutcome::Accepted | CommitOutcome::AcceptedUnconfirmed(_)
        )
    }
}

/// The "Voting Results" block shown once a vote has been cast.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SessionSummary {
    pub total_votes: u64,
    pub leading_option: Option<String>,
    pub leading_percentage: u32,
    pub remaining: String,
}

/// Errors reported synchronously by the state machines.
/// None of them leave a partial mutation behind.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum SessionErrors {
    InvalidOption(String),
    DuplicateOption(String),
    EmptyPoll,
    UnknownUpload(UploadId),
}

impl Error for SessionErrors {}

impl Display for SessionErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionErrors::InvalidOption(id) => write!(f, "no poll option with id {:?}", id),
            SessionErrors::DuplicateOption(id) => {
                write!(f, "poll option id {:?} is used more than once", id)
            }
            SessionErrors::EmptyPoll => write!(f, "a poll needs at least one option"),
            SessionErrors::UnknownUpload(id) => write!(f, "no upload item {}", id),
        }
    }
}

// ********* Configuration **********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UploadRules {
    /// Files above this size are admitted directly as failed.
    pub max_file_bytes: Option<u64>,
    /// Percentage points gained per tick by the simulated transport.
    pub step_percent: u8,
    /// Wall-clock length of one upload tick.
    pub step_millis: u64,
}

impl UploadRules {
    pub const DEFAULT_RULES: UploadRules = UploadRules {
        max_file_bytes: None,
        step_percent: 10,
        step_millis: 200,
    };

    /// The limit advertised by the upload area.
    pub const DASHBOARD_MAX_FILE_BYTES: u64 = 500 * 1024 * 1024;
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SessionRules {
    /// Length of the voting window, in ticks of the countdown.
    pub window_seconds: u32,
    /// Wall-clock length of one countdown tick.
    pub tick_millis: u64,
}

impl SessionRules {
    pub const DEFAULT_RULES: SessionRules = SessionRules {
        window_seconds: 300,
        tick_millis: 1000,
    };
}
