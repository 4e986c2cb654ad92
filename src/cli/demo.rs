//! Small capability set for trying tool turns from the command line.

use chrono::{Local, Utc};
use serde_json::json;

use crate::tools::{CapabilityFn, CapabilityParameters, CapabilityRegistry, HandlerError};

/// `current_time` and `word_count`.
pub fn demo_registry() -> CapabilityRegistry {
    CapabilityRegistry::new()
        .with(CapabilityFn::new(
            "current_time",
            "Current date and time",
            CapabilityParameters::object()
                .string_enum("format", "Output format", &["rfc3339", "unix"], false)
                .boolean("local", "Use the local time zone instead of UTC", false)
                .build(),
            |args, _caller| async move {
                let local = args.get_bool_opt("local").unwrap_or(false);
                match args.get_str_opt("format").unwrap_or("rfc3339") {
                    "unix" => Ok(json!(Utc::now().timestamp())),
                    "rfc3339" if local => Ok(json!(Local::now().to_rfc3339())),
                    "rfc3339" => Ok(json!(Utc::now().to_rfc3339())),
                    other => Err(HandlerError::InvalidArgument(format!(
                        "unknown format '{other}'"
                    ))),
                }
            },
        ))
        .with(CapabilityFn::new(
            "word_count",
            "Count the words and characters of a text",
            CapabilityParameters::object()
                .string("text", "Text to count", true)
                .build(),
            |args, _caller| async move {
                let text = args.get_str("text")?;
                Ok(json!({
                    "words": text.split_whitespace().count(),
                    "characters": text.chars().count(),
                }))
            },
        ))
}
