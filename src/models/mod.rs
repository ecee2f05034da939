pub mod checkpoint;
pub mod location_record;
pub mod report;
pub mod sync_settings;
pub mod sync_state;
pub mod time_record;

pub use checkpoint::{Checkpoint, CheckpointVerification, PatrolLocation};
pub use location_record::LocationRecord;
pub use report::IncidentReport;
pub use sync_settings::SyncSettings;
pub use sync_state::SyncState;
pub use time_record::{TimeRecord, TimeRecordType};
