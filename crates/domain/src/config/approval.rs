use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approval coordinator (component E)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Max character length of an input preview shown to an approver
    /// before truncation (§4.E sanitizer).
    #[serde(default = "d_preview_char_limit")]
    pub preview_char_limit: usize,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            preview_char_limit: d_preview_char_limit(),
        }
    }
}

fn d_preview_char_limit() -> usize {
    500
}
