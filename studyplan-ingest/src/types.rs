use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Pdf,
    Image,
    Text,
    Unsupported,
}

impl DocumentKind {
    /// Classify by file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => DocumentKind::Pdf,
            "png" | "jpg" | "jpeg" => DocumentKind::Image,
            "txt" | "md" => DocumentKind::Text,
            _ => DocumentKind::Unsupported,
        }
    }
}

/// MIME type of a supported image, by extension.
pub fn image_media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// External PDF-to-text command. `{file}` in `args` is replaced by the
/// document path; the command's stdout is taken as the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for PdfCommand {
    fn default() -> Self {
        Self {
            program: "pdftotext".to_string(),
            args: vec!["{file}".to_string(), "-".to_string()],
        }
    }
}

impl PdfCommand {
    pub fn args_for(&self, file: &Path) -> Vec<String> {
        let file = file.display().to_string();
        self.args.iter().map(|a| a.replace("{file}", &file)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(DocumentKind::from_path(Path::new("notes/Syllabus.PDF")), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_path(Path::new("board.jpeg")), DocumentKind::Image);
        assert_eq!(DocumentKind::from_path(Path::new("todo.md")), DocumentKind::Text);
        assert_eq!(DocumentKind::from_path(Path::new("deck.pptx")), DocumentKind::Unsupported);
        assert_eq!(DocumentKind::from_path(Path::new("README")), DocumentKind::Unsupported);
    }

    #[test]
    fn pdf_command_substitutes_path() {
        let cmd = PdfCommand::default();
        assert_eq!(cmd.args_for(Path::new("/tmp/a.pdf")), vec!["/tmp/a.pdf", "-"]);
    }

    #[test]
    fn image_media_types() {
        assert_eq!(image_media_type(Path::new("board.PNG")), Some("image/png"));
        assert_eq!(image_media_type(Path::new("scan.jpg")), Some("image/jpeg"));
        assert_eq!(image_media_type(Path::new("notes.md")), None);
        assert_eq!(image_media_type(Path::new("README")), None);
    }
}
