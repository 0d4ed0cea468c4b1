//! `libtrash` — a FreeDesktop.org trash manager core: physical trash
//! repositories, a routing layer across them, a small wire protocol, peer
//! propagation over TCP, and a job scheduler to drive it all from a UI.

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod peer;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod util;

pub use codec::{Command, Decoder, Encoder, Event};
pub use config::Config;
pub use error::{
    MoveError, RepositoryError, RouterError, SchedulerError, TransportError, TrashInfoReadError,
};
pub use peer::{ConnectionKey, EventListener, Transport};
pub use repository::{
    CopyThenDelete, DirectoryAttributes, HomeAttributes, InfoFile, Mover, PhysicalRepository,
    RenameOnly, TopAttributes, TrashItem, TryAnything,
};
pub use router::{parse_trash_key, CustomMapping, DirectoryList, RepoUsage, Router, TrashKey};
pub use scheduler::{Action, Job, JobListener, NullListener, Scheduler};
