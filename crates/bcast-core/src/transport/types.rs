use std::path::PathBuf;

/// Photo reference accepted by transports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaRef {
    /// A file already uploaded to the messenger (Telegram `file_id`).
    FileId(String),
    /// A local file, uploaded with every send.
    Path(PathBuf),
}

/// The message delivered to every recipient of one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessagePayload {
    Text { text: String },
    Photo { caption: String, media: MediaRef },
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn photo(media: MediaRef, caption: impl Into<String>) -> Self {
        Self::Photo {
            caption: caption.into(),
            media,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Photo { .. } => "photo",
        }
    }
}
