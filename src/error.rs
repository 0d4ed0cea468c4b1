//! Error taxonomy for the trash core, one enum per component.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while moving bytes between the original location and a
/// repository's `files/` directory (the mover strategies).
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("'{0}' does not exist")]
    FileToTrashDoesNotExist(PathBuf),
    /// Internal signal: the move can't be done with a rename. The router
    /// catches this and falls through to the next resolution layer; it must
    /// never be surfaced to a user.
    #[error("'{from}' -> '{to}' is not renamable")]
    NonRenamable { from: PathBuf, to: PathBuf },
    #[error("can't move to trash (errno {errno})")]
    CanNotMoveToTrash { errno: i32 },
    #[error("can't move '{source}' to '{destination}': {reason}")]
    CanNotMoveFile {
        source: PathBuf,
        destination: PathBuf,
        reason: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why a `.trashinfo` file failed to parse. Repository::items() skips the
/// offending entry and continues.
#[derive(Debug, Error)]
pub enum TrashInfoReadError {
    #[error("missing '[Trash Info]' header")]
    MissingHeader,
    #[error("missing Path= line")]
    MissingName,
    #[error("missing DeletionDate= line")]
    MissingDate,
    #[error("malformed trashinfo file")]
    BadFile,
    #[error("can't read info directory: {0}")]
    CantOpenDir(#[source] std::io::Error),
}

/// Errors raised by a [`crate::repository::PhysicalRepository`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Move(#[from] MoveError),
    #[error("could not write trashinfo for '{0}'")]
    CanNotCreateTrashInfo(String),
    #[error(transparent)]
    TrashInfoRead(#[from] TrashInfoReadError),
    #[error("can't remove '{file}': {reason}")]
    CantRemoveFile { file: String, reason: String },
    #[error("can't unlink '{file}': {reason}")]
    CanNotUnlinkFile { file: String, reason: String },
    #[error("can't shred '{file}': {reason}")]
    CanNotShredFile { file: String, reason: String },
    #[error("trash directory '{directory}' has the wrong mode ({mode:o})")]
    TrashDirectoryMode { directory: PathBuf, mode: u32 },
    #[error("can't create directory '{0}'")]
    CantMakeDirectory(PathBuf),
    #[error("trash item '{0}' not found")]
    NoSuchTrashItem(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the [`crate::router::Router`].
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("neither XDG_DATA_HOME nor HOME is set")]
    NoUsefulHomeEnv,
    #[error("no trash directory could be found for '{0}'")]
    NoDirectoryForTarget(String),
    #[error("invalid trash key format: '{0}'")]
    InvalidTrashNameFormat(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the Peer Transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("can't allocate a socket (errno {0})")]
    NoAllocSock(i32),
    #[error("can't bind to port {port} (errno {errno})")]
    CantBind { port: u16, errno: i32 },
    #[error("can't listen (errno {0})")]
    CantListen(i32),
    #[error("can't resolve hostname '{0}'")]
    CantResolveHostname(String),
    #[error("can't connect to {host}:{port} (errno {errno})")]
    CantConnect { host: String, port: u16, errno: i32 },
    #[error("read error (errno {0})")]
    ReadError(i32),
    #[error("write error (errno {0})")]
    WriteError(i32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the [`crate::scheduler::Scheduler`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job already scheduled: {0:?}")]
    JobAlreadyScheduled(crate::scheduler::Job),
    #[error("job queue closed")]
    JobsQueueClosed,
}
