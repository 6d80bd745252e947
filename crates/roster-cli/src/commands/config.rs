use anyhow::Result;
use roster_core::NodeConfig;

pub fn print(config: &NodeConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
