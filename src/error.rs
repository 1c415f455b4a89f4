use crate::quest::QuestId;
use crate::store::StoreError;
use crate::upload::UploadError;

/// Broad classes of [`HuntError`], used by the transport layer to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad credentials.
    Auth,
    /// No session, or a session for another team.
    Authz,
    NotFound,
    /// A submission that can be corrected and retried.
    Validation,
    /// A submission that arrived before the quest-timer elapsed.
    TimerGate,
    /// The team's game is over.
    Finished,
    Internal,
}

/// Errors from hunt operations. None of these are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum HuntError {
    #[error("Error: Invalid credentials.")]
    InvalidCredentials,

    #[error("Error: Not logged in as team {0}.")]
    Unauthorized(String),

    #[error("Error: Unknown team {0}.")]
    UnknownTeam(String),

    #[error("Error: Quest {0} not found.")]
    QuestNotFound(QuestId),

    #[error("Error: Quest {requested} is not the current quest.")]
    QuestNotCurrent { requested: QuestId },

    #[error("Error: The game has already finished.")]
    GameFinished,

    #[error("Error: Quest timer has not elapsed, {remaining} remaining.")]
    TimerNotElapsed { remaining: String },

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Error: Internal lock error.")]
    LockError,
}

impl HuntError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HuntError::InvalidCredentials => ErrorKind::Auth,
            HuntError::Unauthorized(_) | HuntError::UnknownTeam(_) => ErrorKind::Authz,
            HuntError::QuestNotFound(_) => ErrorKind::NotFound,
            HuntError::QuestNotCurrent { .. } | HuntError::Upload(_) => ErrorKind::Validation,
            HuntError::TimerNotElapsed { .. } => ErrorKind::TimerGate,
            HuntError::GameFinished => ErrorKind::Finished,
            HuntError::Store(_) | HuntError::LockError => ErrorKind::Internal,
        }
    }
}
