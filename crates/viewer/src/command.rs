//! JSON command protocol for driving the viewer headlessly.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CommandError;
use crate::harness::TestHarness;
use crate::state::ActiveTool;
use crate::viewport::camera::ViewPreset;

/// A command an agent can execute against the harness.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AgentCommand {
    /// Load a text asset (PLY ascii, OBJ, glTF with embedded buffers)
    LoadBytes { name: String, contents: String },
    /// Switch the active tool.
    SetTool { tool: ActiveTool },
    /// Click where a world point projects on screen.
    ClickWorld { point: Vec3 },
    /// Complete the current area or volume measurement.
    FinishMeasurement,
    SetAnnotationText { id: Uuid, text: String },
    DeleteAnnotation { id: Uuid },
    DeleteMeasurement { id: Uuid },
    ApplyPreset { preset: ViewPreset },
    /// Frame the loaded asset.
    Fit,
    /// Inspect the scene: asset, tools, camera.
    Inspect,
    /// Export measurements and annotations as a JSON report.
    ExportReport,
}

/// Response from executing a command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResponse {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    fn ok_with_data(data: serde_json::Value) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            data: None,
        }
    }
}

/// Execute a single command on the harness.
pub fn execute_command(harness: &mut TestHarness, cmd: AgentCommand) -> CommandResponse {
    match cmd {
        AgentCommand::LoadBytes { name, contents } => match harness.load_bytes(&name, contents) {
            Ok(()) => {
                let asset = harness.engine().asset().map(|a| {
                    serde_json::json!({
                        "tag": a.tag,
                        "vertices": a.vertex_count(),
                        "faces": a.face_count(),
                    })
                });
                CommandResponse::ok_with_data(serde_json::json!({ "asset": asset }))
            }
            Err(e) => CommandResponse::err(e.to_string()),
        },

        AgentCommand::SetTool { tool } => {
            harness.set_tool(tool);
            CommandResponse::ok()
        }

        AgentCommand::ClickWorld { point } => {
            let outcome = harness.click_world(point);
            CommandResponse::ok_with_data(serde_json::json!(outcome))
        }

        AgentCommand::FinishMeasurement => match harness.engine_mut().finish_measurement() {
            Some(id) => CommandResponse::ok_with_data(serde_json::json!({ "id": id })),
            None => CommandResponse::err("Not enough points to finish the measurement"),
        },

        AgentCommand::SetAnnotationText { id, text } => {
            let updated = harness.engine_mut().set_annotation_text(id, text);
            CommandResponse::ok_with_data(serde_json::json!({ "updated": updated }))
        }

        AgentCommand::DeleteAnnotation { id } => {
            let removed = harness.engine_mut().delete_annotation(id);
            CommandResponse::ok_with_data(serde_json::json!({ "removed": removed }))
        }

        AgentCommand::DeleteMeasurement { id } => {
            let removed = harness.engine_mut().delete_measurement(id);
            CommandResponse::ok_with_data(serde_json::json!({ "removed": removed }))
        }

        AgentCommand::ApplyPreset { preset } => {
            harness.engine_mut().apply_preset(preset);
            CommandResponse::ok()
        }

        AgentCommand::Fit => {
            harness.engine_mut().fit_to_asset();
            CommandResponse::ok()
        }

        AgentCommand::Inspect => CommandResponse::ok_with_data(harness.inspect()),

        AgentCommand::ExportReport => match serde_json::to_value(harness.engine().report()) {
            Ok(report) => CommandResponse::ok_with_data(report),
            Err(e) => CommandResponse::err(e.to_string()),
        },
    }
}

/// Parse and execute a single JSON command string.
pub fn execute_json(harness: &mut TestHarness, json: &str) -> Result<CommandResponse, CommandError> {
    let cmd: AgentCommand = serde_json::from_str(json)?;
    Ok(execute_command(harness, cmd))
}

/// Parse and execute multiple JSON commands (array).
pub fn execute_json_batch(
    harness: &mut TestHarness,
    json: &str,
) -> Result<Vec<CommandResponse>, CommandError> {
    let cmds: Vec<AgentCommand> = serde_json::from_str(json)?;
    Ok(cmds
        .into_iter()
        .map(|cmd| execute_command(harness, cmd))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MeasurementKind;

    #[test]
    fn test_command_serde_set_tool() {
        let json = r#"{"command": "set_tool", "tool": {"tool": "measure", "kind": "area"}}"#;
        let cmd: AgentCommand = serde_json::from_str(json).unwrap();
        match cmd {
            AgentCommand::SetTool { tool } => {
                assert_eq!(tool, ActiveTool::Measure(MeasurementKind::Area))
            }
            _ => panic!("Expected SetTool"),
        }
    }

    #[test]
    fn test_command_serde_click_world() {
        let json = r#"{"command": "click_world", "point": [1.0, 2.0, 3.0]}"#;
        let cmd: AgentCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, AgentCommand::ClickWorld { point } if point == Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_command_serde_preset() {
        let json = r#"{"command": "apply_preset", "preset": "isometric"}"#;
        let cmd: AgentCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, AgentCommand::ApplyPreset { preset: ViewPreset::Isometric }));
    }

    #[test]
    fn test_unknown_command_rejected() {
        let mut h = TestHarness::new().unwrap();
        let err = execute_json(&mut h, r#"{"command": "explode"}"#).unwrap_err();
        assert!(matches!(err, CommandError::InvalidJson(_)));
    }

    #[test]
    fn test_finish_without_points_fails() {
        let mut h = TestHarness::new().unwrap();
        let resp = execute_json(&mut h, r#"{"command": "finish_measurement"}"#).unwrap();
        assert!(!resp.success);
    }
}
