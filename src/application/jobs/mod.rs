//! Background job processors driven from the entry point's worker monitor.

mod purge_trash;

pub use purge_trash::{
    PurgeTrashContext, PurgeTrashJob, parse_purge_schedule, process_purge_trash_job,
};
