pub mod check;
pub mod entities;
pub mod schema;
pub mod search;

use std::path::Path;

use anyhow::{Context, Result};
use declaro::{CompiledManifest, Manifest};

use crate::context::ProjectContext;
use crate::output::OutputManager;

/// Loads and compiles the manifest named on the command line.
pub fn load_compiled(ctx: &ProjectContext, path: &Path, output: &OutputManager) -> Result<CompiledManifest> {
    let path = ctx.manifest_path(path)?;
    output.verbose(&format!("loading manifest {}", path.display()));

    let manifest = Manifest::load(&path).with_context(|| format!("Failed to load manifest {}", path.display()))?;
    manifest
        .compile()
        .with_context(|| format!("Failed to compile manifest {}", path.display()))
}
