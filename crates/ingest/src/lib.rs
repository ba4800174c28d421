//! CSV sales ingestion: scan a watched directory, validate rows, write one
//! batch per file and delete what was committed.

pub mod batch;
pub mod cycle;
pub mod error;
pub mod job_log;
pub mod ledger;
pub mod lifecycle;
pub mod parser;
pub mod report;
pub mod scanner;
pub mod scheduler;
pub mod store;

pub use batch::IngestBatch;
pub use cycle::Ingestor;
pub use error::IngestError;
pub use parser::{parse_file, parse_reader, DropReport, ParsedFile, RowRejection};
pub use report::{CycleHistory, CycleReport, FileOutcome, FileReport, TriggerKind};
pub use scanner::{scan_directory, WatchedFile};
pub use scheduler::run_scheduler;
pub use store::{open_store, MemorySaleStore, PgSaleStore, SaleStore, StoreError};
