use anyhow::{Context, Result};
use emu_core::types::{FrameBuffer, BYTES_PER_PIXEL};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write the active part of `frame` as an RGBA PNG.
pub fn write_png(path: &Path, frame: &FrameBuffer) -> Result<()> {
    let width = frame.width as usize;
    let mut data = Vec::with_capacity(width * BYTES_PER_PIXEL * frame.active_height);
    for y in 0..frame.active_height {
        if let Some(row) = frame.row(y) {
            data.extend_from_slice(&row[..width * BYTES_PER_PIXEL]);
        }
    }

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.active_height as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&data)?;
    writer.finish()?;
    Ok(())
}
