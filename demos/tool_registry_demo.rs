//! Registers a tool and exercises the argument binding rules from the
//! command line.

use anyhow::Result;
use serde_json::json;
use voxlink::{ToolDefinition, ToolParameter, ToolRegistry, VoxlinkError};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let registry = ToolRegistry::new();
    registry.register(vec![ToolDefinition::from_fn(
        "add",
        "Add two numbers",
        vec![
            ToolParameter::required("a", "first addend"),
            ToolParameter::required("b", "second addend"),
        ],
        |args| async move {
            let a = args[0].as_i64().ok_or_else(|| VoxlinkError::InvalidData {
                reason: "a is not a number".to_string(),
            })?;
            let b = args[1].as_i64().ok_or_else(|| VoxlinkError::InvalidData {
                reason: "b is not a number".to_string(),
            })?;
            Ok(json!(a + b))
        },
    )]);

    println!("add(2, 3)      -> {}", registry.dispatch("add", r#"{"a":2,"b":3}"#).await);
    println!("add(missing b) -> {}", registry.dispatch("add", r#"{"a":2}"#).await);
    println!("unknown tool   -> {}", registry.dispatch("mul", r#"{}"#).await);
    Ok(())
}
