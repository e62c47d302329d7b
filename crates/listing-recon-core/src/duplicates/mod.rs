pub mod detect;
pub mod gate;
pub mod resolve;

pub use detect::{detect_duplicates, duplicate_row_count, ConflictRow, DuplicateReport};
pub use gate::GateState;
pub use resolve::{RenameRow, Resolution, ResolutionMap, Strategy};
