use std::path::Path;

use modelpack_build::layers::{self, FsSizer, WORKSPACE_DEST};
use modelpack_core::ModelpackConfig;

/// Prints the workspace layer plan without generating a Dockerfile.
pub fn plan(dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = ModelpackConfig::load(dir)?;
    let settings = &config.layers;

    if !settings.group_files {
        if json {
            println!("{}", serde_json::json!({ "group_files": false }));
        } else {
            println!("Grouping disabled: COPY . {WORKSPACE_DEST}");
        }
        return Ok(());
    }

    let entries = layers::list_workspace(dir)?;
    let plan = layers::plan(
        settings.max_file_groups,
        settings.size_threshold,
        &entries,
        &FsSizer::new(dir),
    )?;
    tracing::debug!(
        entries = entries.len(),
        layers = plan.copy_instructions().len(),
        "planned workspace layers"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!(
        "{} entries, threshold {} bytes, {} small-file group(s)",
        entries.len(),
        settings.size_threshold,
        settings.max_file_groups
    );
    println!();
    for (i, instruction) in plan.copy_instructions().iter().enumerate() {
        println!("  {:>3}. {instruction}", i + 1);
    }

    Ok(())
}
