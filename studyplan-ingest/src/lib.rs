//! studyplan-ingest: turning uploaded documents (text, PDF, images) into plain text.

pub mod extract;
pub mod types;

pub use extract::{combine_documents, FileExtractor, ImageReader, READ_IMAGE_PROMPT};
pub use types::{image_media_type, DocumentKind, PdfCommand};
