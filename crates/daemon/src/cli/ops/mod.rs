mod claim;
pub mod cleanup;
pub mod init;
pub mod messages;
pub mod query;
pub mod summary;
pub mod version;

pub use claim::{Dismiss, Propose};
pub use cleanup::Cleanup;
pub use init::Init;
pub use messages::Messages;
pub use query::Query;
pub use summary::Summary;
pub use version::Version;
