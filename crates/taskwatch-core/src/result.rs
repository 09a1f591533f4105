use serde::Serialize;

use crate::task::TaskId;

/// A finished task's detection output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub bbox: serde_json::Value,
    pub file_name: String,
    /// Annotated image, also used as the download link.
    pub image_url: String,
}

impl TaskResult {
    /// Bounding boxes as JSON indented by four spaces.
    pub fn bbox_pretty(&self) -> String {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        match self.bbox.serialize(&mut ser) {
            Ok(()) => String::from_utf8(buf).unwrap_or_default(),
            Err(_) => self.bbox.to_string(),
        }
    }
}
