//! logkeeper storage layer: rotation, compression and retention over the
//! local filesystem.

pub mod archive;
pub mod compressor;
pub mod probe;
pub mod retention;
pub mod rotation;

pub use archive::list_archives;
pub use compressor::{BacklogReport, Compressor};
pub use probe::FileProbe;
pub use retention::{RetentionSweeper, SweepReport};
pub use rotation::{should_rotate, RotationEngine, RotationOutcome, RotationReport};
