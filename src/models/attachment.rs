use crate::error::AppError;
use crate::models::message::AttachmentRef;

/// Hard cap on staged file size.
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Extensions treated as text even when the browser reports no text/* mime.
const TEXT_EXTENSIONS: [&str; 7] = ["js", "py", "md", "json", "html", "css", "txt"];

/// Decoded payload of a staged file, produced by the host's file reader.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentData {
    /// Base64-encoded image bytes, sent inline to the remote model.
    Image { base64: String },
    /// Decoded text content, inlined into the outbound message.
    Text { content: String },
    /// Attached but unreadable here (PDF); the model gets a placeholder note.
    Opaque,
}

/// Raw record handed over by the file-picker collaborator.
#[derive(Debug, Clone, Default)]
pub struct FileInput {
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub base64_data: Option<String>,
    pub text_data: Option<String>,
}

impl FileInput {
    /// Build an image record from raw bytes, encoding them for inline
    /// delivery. For hosts whose file reader yields bytes rather than a
    /// data URL.
    pub fn from_image_bytes(
        name: impl Into<String>,
        mime: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        Self {
            name: name.into(),
            mime: mime.into(),
            size: bytes.len() as u64,
            base64_data: Some(STANDARD.encode(bytes)),
            text_data: None,
        }
    }
}

/// The one file staged for inclusion in the next outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAttachment {
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub data: AttachmentData,
}

impl PendingAttachment {
    /// Validate and stage a file record. Oversized or unsupported files are
    /// rejected before they can reach the transcript or the remote call.
    pub fn stage(input: FileInput) -> Result<Self, AppError> {
        if input.size > MAX_ATTACHMENT_BYTES {
            return Err(AppError::AttachmentTooLarge(input.size));
        }

        let data = if input.mime.starts_with("image/") {
            match input.base64_data {
                Some(base64) if !base64.is_empty() => AttachmentData::Image { base64 },
                _ => {
                    return Err(AppError::AttachmentUnsupported(format!(
                        "image '{}' has no decoded payload",
                        input.name
                    )))
                }
            }
        } else if input.mime.starts_with("text/") || has_text_extension(&input.name) {
            match input.text_data {
                Some(content) => AttachmentData::Text { content },
                None => {
                    return Err(AppError::AttachmentUnsupported(format!(
                        "text file '{}' has no decoded content",
                        input.name
                    )))
                }
            }
        } else if input.mime == "application/pdf" {
            AttachmentData::Opaque
        } else {
            return Err(AppError::AttachmentUnsupported(input.mime));
        };

        Ok(Self {
            name: input.name,
            mime: input.mime,
            size: input.size,
            data,
        })
    }

    /// What the transcript records for this attachment.
    pub fn display_ref(&self) -> AttachmentRef {
        let image_data_uri = match &self.data {
            AttachmentData::Image { base64 } => {
                Some(format!("data:{};base64,{}", self.mime, base64))
            }
            _ => None,
        };
        AttachmentRef {
            name: self.name.clone(),
            mime: self.mime.clone(),
            image_data_uri,
        }
    }

    /// The outbound text part for non-image attachments: inlined content for
    /// text files, a placeholder note for opaque ones. Images are sent as
    /// inline binary instead and return `None` here.
    pub fn outbound_text(&self) -> Option<String> {
        match &self.data {
            AttachmentData::Image { .. } => None,
            AttachmentData::Text { content } => Some(format!(
                "\n\n--- User attached file: {} ---\n{}\n--- End of user attached file ---",
                self.name, content
            )),
            AttachmentData::Opaque => Some(format!(
                "\n\n--- User attached file: {} (PDF) ---\nNote: I cannot directly read PDF content, but the user has attached this file.",
                self.name
            )),
        }
    }

    /// Short preview of text content for the staging UI (first 200 chars).
    pub fn preview_snippet(&self) -> Option<String> {
        match &self.data {
            AttachmentData::Text { content } => {
                let snippet: String = content.chars().take(200).collect();
                if content.chars().count() > 200 {
                    Some(format!("{snippet}..."))
                } else {
                    Some(snippet)
                }
            }
            _ => None,
        }
    }
}

fn has_text_extension(name: &str) -> bool {
    name.rsplit('.')
        .next()
        .map(|ext| TEXT_EXTENSIONS.iter().any(|t| ext.eq_ignore_ascii_case(t)))
        .unwrap_or(false)
}
