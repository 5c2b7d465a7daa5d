use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::update::UpdateOperations;
use crate::util;

pub const MAGIC: &[u8; 8] = b"TSPLAN01";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct PlanFileRef<'a> {
    version: u32,
    operations: &'a UpdateOperations,
}

#[derive(Deserialize)]
struct PlanFile {
    version: u32,
    operations: UpdateOperations,
}

/// Write a plan as magic header + zstd-compressed bincode.
pub fn write_plan(plan: &UpdateOperations, output: &Path) -> Result<()> {
    if !plan.valid {
        bail!("Refusing to write an invalid update plan");
    }

    let encoded = bincode::serialize(&PlanFileRef {
        version: FORMAT_VERSION,
        operations: plan,
    })
    .context("Failed to serialize update plan")?;

    let compressed = zstd::bulk::compress(&encoded, 3).context("Failed to compress update plan")?;

    let mut file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create plan file: {}", output.display()))?;
    file.write_all(MAGIC)?;
    file.write_all(&compressed)?;
    file.flush()?;
    Ok(())
}

/// Read a plan written by [`write_plan`].
pub fn read_plan(path: &Path) -> Result<UpdateOperations> {
    // mmap the plan file, check magic, then stream-decompress into bincode
    let raw = util::mmap_file(path)?;

    if raw.len() < MAGIC.len() || &raw[..MAGIC.len()] != MAGIC {
        bail!("Invalid plan file: missing magic header");
    }

    let decoder =
        zstd::Decoder::new(&raw[MAGIC.len()..]).context("Failed to create zstd decoder")?;
    let plan: PlanFile =
        bincode::deserialize_from(decoder).context("Failed to deserialize update plan")?;

    if plan.version != FORMAT_VERSION {
        bail!(
            "Unsupported plan version: {} (expected {})",
            plan.version,
            FORMAT_VERSION
        );
    }
    if !plan.operations.valid {
        bail!("Plan file contains an invalid plan");
    }

    Ok(plan.operations)
}
