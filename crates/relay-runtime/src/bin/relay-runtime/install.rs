//! `install` / `uninstall`: the editor.json integration marker.

use std::path::PathBuf;

use relay_runtime::config::platform_data_dir;
use relay_runtime::integration::{
    editor_file, ensure_editor_marker, remove_editor_marker, InstallOutcome,
};

use crate::style;

fn resolve_dir(dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(platform_data_dir()?),
    }
}

pub fn run_install(dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = resolve_dir(dir)?;
    let path = editor_file(&dir);
    match ensure_editor_marker(&dir)? {
        InstallOutcome::Created => {
            println!("{}", style::success(format!("Created {}", path.display())));
        }
        InstallOutcome::Switched { from } => {
            println!(
                "{}",
                style::success(format!("Switched {} from {from}", path.display()))
            );
        }
        InstallOutcome::Unchanged { ide } => {
            let owner = ide.unwrap_or_else(|| "unknown".to_string());
            println!(
                "{}",
                style::warning(format!("{} left unchanged (ide: {owner})", path.display()))
            );
        }
    }
    Ok(())
}

pub fn run_uninstall(dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = resolve_dir(dir)?;
    let outcome = remove_editor_marker(&dir)?;
    if outcome.file_removed {
        println!(
            "{}",
            style::success(format!("Deleted {}", editor_file(&dir).display()))
        );
    } else {
        println!("editor.json not found; nothing to delete.");
    }
    if outcome.dir_removed {
        println!("Removed empty folder: {}", dir.display());
    }
    Ok(())
}
