//! Wire frames exchanged over a control connection.
//!
//! Both directions are JSON text frames. Inbound frames carry a control
//! verb plus a command short name and an optional argument vector; outbound
//! frames carry either one completed output line or a command's configured
//! argument string.

use serde::{Deserialize, Serialize};

/// Control verb of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Exec,
    Command,
    Kill,
    Args,
    #[serde(other)]
    Unknown,
}

/// Inbound control frame: `{"Type": ..., "Content": ..., "Args": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFrame {
    #[serde(rename = "Type")]
    pub kind: ControlKind,
    #[serde(rename = "Content", default)]
    pub content: String,
    #[serde(rename = "Args", default)]
    pub args: Vec<String>,
}

/// Outbound frame: a `log` line or an `args` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFrame {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "Prefix", default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl OutputFrame {
    /// One completed output line, tagged with its stream of origin.
    pub fn log(prefix: &str, line: &str) -> Self {
        Self {
            kind: "log".to_string(),
            content: line.to_string(),
            prefix: Some(prefix.to_string()),
        }
    }

    /// Reply to an `args` query.
    pub fn args(content: &str) -> Self {
        Self {
            kind: "args".to_string(),
            content: content.to_string(),
            prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_frame_roundtrip() {
        let frame: ControlFrame =
            serde_json::from_str(r#"{"Type":"exec","Content":"ls","Args":["-la"]}"#).unwrap();
        assert_eq!(frame.kind, ControlKind::Exec);
        assert_eq!(frame.content, "ls");
        assert_eq!(frame.args, vec!["-la"]);
    }

    #[test]
    fn control_frame_defaults() {
        let frame: ControlFrame = serde_json::from_str(r#"{"Type":"kill"}"#).unwrap();
        assert_eq!(frame.kind, ControlKind::Kill);
        assert!(frame.content.is_empty());
        assert!(frame.args.is_empty());
    }

    #[test]
    fn unknown_control_kind_does_not_fail_parsing() {
        let frame: ControlFrame =
            serde_json::from_str(r#"{"Type":"reboot","Content":""}"#).unwrap();
        assert_eq!(frame.kind, ControlKind::Unknown);
    }

    #[test]
    fn log_frame_serializes_with_prefix() {
        let json = serde_json::to_string(&OutputFrame::log("stdout", "hello\n")).unwrap();
        assert_eq!(
            json,
            r#"{"Type":"log","Content":"hello\n","Prefix":"stdout"}"#
        );
    }

    #[test]
    fn args_frame_omits_prefix() {
        let json = serde_json::to_string(&OutputFrame::args("-x y")).unwrap();
        assert_eq!(json, r#"{"Type":"args","Content":"-x y"}"#);
    }
}
