pub mod attachment;
pub mod column;
pub mod mailbox;
pub mod message;
pub mod user;

pub use attachment::Attachment;
pub use column::Column;
pub use mailbox::{Mailbox, SyncStatus};
pub use message::{Category, Email, TaskStatus};
pub use user::User;
