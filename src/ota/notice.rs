//! Status-topic payload.
//!
//! ```text
//! {"status":"downloading","progress":50}
//! {"status":"downloading","progress":50,"resumed":true}
//! {"status":"error","progress":75,"message":"size mismatch"}
//! ```

use serde::Serialize;

use super::OtaError;
use crate::app::ports::NoticeSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeStatus {
    Started,
    Downloading,
    Applying,
    Complete,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OtaNotice {
    pub status: NoticeStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "core::ops::Not::not")]
    pub resumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl OtaNotice {
    fn new(status: NoticeStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            resumed: false,
            message: None,
        }
    }

    pub fn started() -> Self {
        Self::new(NoticeStatus::Started, 0)
    }

    pub fn downloading(progress: u8) -> Self {
        Self::new(NoticeStatus::Downloading, progress)
    }

    pub fn resumed(progress: u8) -> Self {
        Self {
            resumed: true,
            ..Self::new(NoticeStatus::Downloading, progress)
        }
    }

    pub fn applying() -> Self {
        Self::new(NoticeStatus::Applying, 100)
    }

    pub fn complete() -> Self {
        Self::new(NoticeStatus::Complete, 100)
    }

    pub fn error(reason: OtaError, progress: u8) -> Self {
        Self {
            message: Some(reason.reason()),
            ..Self::new(NoticeStatus::Error, progress)
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Recording sink, used where notices are inspected after the fact.
impl NoticeSink for Vec<OtaNotice> {
    fn notify(&mut self, notice: &OtaNotice) {
        self.push(*notice);
    }
}
