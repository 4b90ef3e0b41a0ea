use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy evaluator (component B)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// System-wide default when no rule matches and the descriptor has
    /// no explicit approval mode of its own.
    #[serde(default = "d_system_default")]
    pub system_default: SystemDefaultEffect,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            system_default: d_system_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemDefaultEffect {
    Allow,
    RequireApproval,
    Deny,
}

fn d_system_default() -> SystemDefaultEffect {
    SystemDefaultEffect::RequireApproval
}
