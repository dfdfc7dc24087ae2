//! Tag encode/decode command implementations.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use tagpair_core::{FileTag, TagRecord, TagTransport};

use crate::cli::OutputFormat;

pub async fn cmd_encode(key: &str, value: Option<&str>, path: &Path, quiet: bool) -> Result<()> {
    let value: Option<Value> = value
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--value is not valid JSON")?;

    let payload = tagpair_types::encode(Some(key), value.as_ref())?;
    let tag = FileTag::new(path);
    tag.activate_session().await?;
    tag.write(&payload)
        .await
        .with_context(|| format!("Failed to write tag {}", path.display()))?;

    if !quiet {
        println!("Wrote {} bytes to {}", payload.len(), path.display());
    }
    Ok(())
}

pub async fn cmd_decode(path: &Path, format: OutputFormat) -> Result<()> {
    let tag = FileTag::new(path);
    tag.activate_session().await?;
    let payload = tag
        .detect()
        .await
        .with_context(|| format!("Failed to read tag {}", path.display()))?;

    let record: TagRecord<Value> = tagpair_types::decode(&payload)
        .with_context(|| format!("{} is not a tag record", path.display()))?;
    print!("{}", format_record(&record, format)?);
    Ok(())
}

fn format_record(record: &TagRecord<Value>, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "pairing_key": record.pairing_key(),
                "value": record.value(),
            });
            format!("{}\n", serde_json::to_string_pretty(&json)?)
        }
        OutputFormat::Text => {
            let value = match record.value() {
                Some(value) => serde_json::to_string(value)?,
                None => "-".to_string(),
            };
            format!(
                "Pairing key: {}\nValue:       {}\n",
                record.pairing_key().unwrap_or("-"),
                value
            )
        }
    })
}
