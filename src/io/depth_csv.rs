//! Depth summary tables: `frame_id,depth_min,depth_max,depth_mean,depth_median`.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::Deserialize;

use crate::trajectory::{DepthStats, FrameId};

#[derive(Debug, Deserialize)]
struct DepthRow {
    frame_id: u64,
    depth_min: f64,
    depth_max: f64,
    depth_mean: f64,
    depth_median: f64,
}

pub fn read_depth_summary<R: Read>(reader: R) -> Result<BTreeMap<FrameId, DepthStats>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut out = BTreeMap::new();
    for (line, rec) in rdr.deserialize::<DepthRow>().enumerate() {
        let row = rec.with_context(|| format!("Bad depth row {}", line + 1))?;
        out.insert(
            FrameId::new(row.frame_id),
            DepthStats {
                min: row.depth_min,
                max: row.depth_max,
                mean: row.depth_mean,
                median: row.depth_median,
            },
        );
    }
    Ok(out)
}

pub fn read_depth_summary_csv<P: AsRef<Path>>(path: P) -> Result<BTreeMap<FrameId, DepthStats>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    read_depth_summary(file)
}

pub fn write_depth_summary<W: Write>(
    writer: W,
    depth: &BTreeMap<FrameId, DepthStats>,
) -> Result<()> {
    let mut w = WriterBuilder::new().from_writer(writer);
    w.write_record([
        "frame_id",
        "depth_min",
        "depth_max",
        "depth_mean",
        "depth_median",
    ])?;
    for (id, d) in depth {
        w.write_record([
            id.0.to_string(),
            format!("{:.6}", d.min),
            format!("{:.6}", d.max),
            format!("{:.6}", d.mean),
            format!("{:.6}", d.median),
        ])?;
    }
    w.flush()?;
    Ok(())
}
