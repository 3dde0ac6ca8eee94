use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid team size: a team needs at least one thread, got {0}")]
    InvalidTeamSize(usize),

    #[error("Invalid lane width: simdlen must be at least 1, got {0}")]
    InvalidLaneWidth(usize),

    #[error("Output length mismatch: expected {expected} cells, got {got}")]
    OutputLengthMismatch {
        expected: usize,
        got: usize,
    },

    #[error("Unknown variable #{0} is not declared in the data environment")]
    UnknownVariable(usize),

    #[error("Conflicting data-sharing clauses for `{name}`: {reason}")]
    ConflictingClauses {
        name: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Thread {thread} did not publish its local total before the barrier")]
    MissingThreadTotal { thread: usize },

    #[error("Thread {thread} has no scan offset: the cross-thread scan did not publish one")]
    MissingOffset { thread: usize },

    #[error("The cross-thread scan did not publish the grand total")]
    MissingGrandTotal,

    #[error("Scan slot for thread {thread} was published twice")]
    SlotAlreadyPublished { thread: usize },

    #[error("Thread {thread} is outside a team of {team_size}")]
    ThreadOutOfRange {
        thread: usize,
        team_size: usize,
    },

    #[error("Thread team construction failed: {0}")]
    TeamBuild(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, ScanError>;
