// Protective exit levels shared by entries and repairs
pub mod protection;

pub use protection::{ExitLevels, ProtectionRule};
