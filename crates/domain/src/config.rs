use serde::{Deserialize, Serialize};

use crate::stream::ConfigSource;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub panel: PanelConfig,
}

impl BridgeConfig {
    /// Resolve a dotted key (`"segmentation.marker"`) against the serialized
    /// config. Backs the panel's `env` request.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut node = serde_json::to_value(self).ok()?;
        for part in key.split('.') {
            node = node.get(part)?.clone();
        }
        Some(node)
    }
}

impl ConfigSource for BridgeConfig {
    fn lookup(&self, key: &str) -> Option<serde_json::Value> {
        self.get(key)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reasoning/answer segmentation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// When false, every fragment is treated as answer text.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Delimiter that ends the reasoning phase.
    #[serde(default = "d_close_marker")]
    pub marker: String,
    /// Leading tag stripped from the head of the reasoning buffer.
    #[serde(default = "d_open_marker")]
    pub open_marker: String,
    /// Fragments buffered before marker detection starts. 0 disables.
    #[serde(default = "d_10")]
    pub warmup_fragments: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            marker: "</think>".into(),
            open_marker: "<think>".into(),
            warmup_fragments: 10,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Panel-facing values
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Values the sandboxed panel may ask for by key at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Display name shown in the panel header.
    #[serde(default = "d_title")]
    pub title: String,
    /// Whether the panel should render the reasoning stream at all.
    #[serde(default = "d_true")]
    pub show_reasoning: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            title: "Chat".into(),
            show_reasoning: true,
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_10() -> usize {
    10
}
fn d_close_marker() -> String {
    "</think>".into()
}
fn d_open_marker() -> String {
    "<think>".into()
}
fn d_title() -> String {
    "Chat".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_empty_deserialization() {
        let parsed: BridgeConfig = serde_json::from_str("{}").unwrap();
        assert!(parsed.segmentation.enabled);
        assert_eq!(parsed.segmentation.marker, "</think>");
        assert_eq!(parsed.segmentation.open_marker, "<think>");
        assert_eq!(parsed.segmentation.warmup_fragments, 10);
        assert!(parsed.panel.show_reasoning);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let parsed: BridgeConfig = serde_json::from_str(
            r#"{"segmentation": {"warmup_fragments": 0, "enabled": false}}"#,
        )
        .unwrap();
        assert!(!parsed.segmentation.enabled);
        assert_eq!(parsed.segmentation.warmup_fragments, 0);
        assert_eq!(parsed.segmentation.marker, "</think>");
    }

    #[test]
    fn dotted_key_lookup() {
        let cfg = BridgeConfig::default();
        assert_eq!(
            cfg.get("segmentation.marker"),
            Some(serde_json::json!("</think>"))
        );
        assert_eq!(cfg.get("panel.show_reasoning"), Some(serde_json::json!(true)));
        assert_eq!(cfg.get("panel.missing"), None);
    }
}
