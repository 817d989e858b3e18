//! CLI commands implementation

pub mod files;
pub mod init;
pub mod kb;
pub mod search;
pub mod status;

pub use files::*;
pub use init::*;
pub use kb::*;
pub use search::*;
pub use status::*;
