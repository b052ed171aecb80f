pub mod attachment;
pub mod message;
pub mod persona;

pub use attachment::{AttachmentData, FileInput, PendingAttachment, MAX_ATTACHMENT_BYTES};
pub use message::{AttachmentRef, Citation, Message, MessageStatus, Role};
pub use persona::Persona;
