use crate::error::SidecarError;
use arboard::Clipboard;

/// Copy arbitrary text to clipboard
pub fn copy_text(text: &str) -> Result<(), SidecarError> {
    let mut clipboard = Clipboard::new().map_err(|e| SidecarError::Clipboard(e.to_string()))?;
    clipboard
        .set_text(text)
        .map_err(|e| SidecarError::Clipboard(e.to_string()))?;
    Ok(())
}

/// Read the system clipboard for paste-into-agent.
pub fn read_text() -> Result<String, SidecarError> {
    let mut clipboard = Clipboard::new().map_err(|e| SidecarError::Clipboard(e.to_string()))?;
    clipboard
        .get_text()
        .map_err(|e| SidecarError::Clipboard(e.to_string()))
}
