//! Layered Photoshop document writer.
//!
//! Writes an 8 bit RGB PSD with one raster layer per template layer plus a
//! flattened composite, which is what image editors show as the thumbnail
//! and what viewers without layer support fall back to.

use anyhow::{ensure, Result};
use flate2::{write::ZlibEncoder, Compression};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::io::Write;

const SIGNATURE: &[u8; 4] = b"8BPS";
const RESOURCE_SIGNATURE: &[u8; 4] = b"8BIM";
const BLEND_NORMAL: &[u8; 4] = b"norm";
const COLOR_MODE_RGB: u16 = 3;
const MAX_DIMENSION: u32 = 30_000;

const FLAG_HIDDEN: u8 = 0x02;

/// Channel ids in the order they are written: alpha first, then R, G, B.
const LAYER_CHANNELS: [(i16, usize); 4] = [(-1, 3), (0, 0), (1, 1), (2, 2)];

/// Compression used for layer channel data.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelCompression {
    Raw,
    /// PackBits run-length encoding.
    #[default]
    Rle,
    /// Zlib without prediction.
    Zip,
}

impl ChannelCompression {
    fn code(self) -> u16 {
        match self {
            ChannelCompression::Raw => 0,
            ChannelCompression::Rle => 1,
            ChannelCompression::Zip => 2,
        }
    }
}

/// One layer as it goes into the document.
pub struct PsdLayer<'a> {
    pub name: &'a str,
    pub image: &'a RgbaImage,
    pub hidden: bool,
}

/// PackBits-encode `src`, appending to `out`.
pub fn packbits(src: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < src.len() {
        let mut run = 1;
        while i + run < src.len() && run < 128 && src[i + run] == src[i] {
            run += 1;
        }
        if run > 1 {
            out.push((1 - run as i32) as i8 as u8);
            out.push(src[i]);
            i += run;
            continue;
        }
        let start = i;
        while i < src.len() && i - start < 128 {
            if i + 1 < src.len() && src[i] == src[i + 1] {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&src[start..i]);
    }
}

fn plane(image: &RgbaImage, component: usize) -> Vec<u8> {
    image.pixels().map(|p| p.0[component]).collect()
}

/// Compressed channel data, including its leading compression code.
fn encode_channel(data: &[u8], width: usize, compression: ChannelCompression) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2 + 2);
    out.extend_from_slice(&compression.code().to_be_bytes());
    match compression {
        ChannelCompression::Raw => out.extend_from_slice(data),
        ChannelCompression::Rle => {
            let (counts, packed) = packbits_rows(data, width)?;
            out.extend_from_slice(&counts);
            out.extend_from_slice(&packed);
        }
        ChannelCompression::Zip => {
            let mut z = ZlibEncoder::new(out, Compression::default());
            z.write_all(data)?;
            out = z.finish()?;
        }
    }
    Ok(out)
}

/// Row byte counts (big endian u16 each) and the packed rows.
fn packbits_rows(data: &[u8], width: usize) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut counts = Vec::new();
    let mut packed = Vec::new();
    for row in data.chunks(width.max(1)) {
        let before = packed.len();
        packbits(row, &mut packed);
        let n = u16::try_from(packed.len() - before)?;
        counts.extend_from_slice(&n.to_be_bytes());
    }
    Ok((counts, packed))
}

fn pascal_name(name: &str) -> Vec<u8> {
    let bytes: Vec<u8> = name
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .take(255)
        .collect();
    let mut out = vec![bytes.len() as u8];
    out.extend_from_slice(&bytes);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

fn write_u16(w: &mut impl Write, v: u16) -> Result<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

fn write_u32(w: &mut impl Write, v: u32) -> Result<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

fn write_block(w: &mut impl Write, data: &[u8]) -> Result<()> {
    write_u32(w, u32::try_from(data.len())?)?;
    w.write_all(data)?;
    Ok(())
}

/// Layer records followed by channel image data, padded to even length.
fn layer_info(layers: &[PsdLayer], compression: ChannelCompression) -> Result<Vec<u8>> {
    let mut records = Vec::new();
    let mut channels = Vec::new();
    write_u16(&mut records, u16::try_from(layers.len())?)?;

    for layer in layers {
        let (w, h) = layer.image.dimensions();
        for v in [0, 0, h, w] {
            write_u32(&mut records, v)?;
        }
        write_u16(&mut records, LAYER_CHANNELS.len() as u16)?;
        for (id, component) in LAYER_CHANNELS {
            let data = encode_channel(&plane(layer.image, component), w as usize, compression)?;
            records.write_all(&id.to_be_bytes())?;
            write_u32(&mut records, u32::try_from(data.len())?)?;
            channels.extend_from_slice(&data);
        }
        records.write_all(RESOURCE_SIGNATURE)?;
        records.write_all(BLEND_NORMAL)?;
        // opacity, clipping, flags, filler
        let flags = if layer.hidden { FLAG_HIDDEN } else { 0 };
        records.write_all(&[255, 0, flags, 0])?;

        let mut extra = Vec::new();
        write_u32(&mut extra, 0)?; // layer mask
        write_u32(&mut extra, 0)?; // blending ranges
        extra.extend_from_slice(&pascal_name(layer.name));
        write_block(&mut records, &extra)?;
    }

    records.extend_from_slice(&channels);
    if records.len() % 2 != 0 {
        records.push(0);
    }
    Ok(records)
}

/// Flattened RGB image, always RLE unless raw output was asked for.
fn merged_image(composite: &RgbaImage, compression: ChannelCompression) -> Result<Vec<u8>> {
    let width = composite.width() as usize;
    let mut out = Vec::new();
    if compression == ChannelCompression::Raw {
        write_u16(&mut out, ChannelCompression::Raw.code())?;
        for c in 0..3 {
            out.extend_from_slice(&plane(composite, c));
        }
        return Ok(out);
    }
    write_u16(&mut out, ChannelCompression::Rle.code())?;
    let mut all_counts = Vec::new();
    let mut all_packed = Vec::new();
    for c in 0..3 {
        let (counts, packed) = packbits_rows(&plane(composite, c), width)?;
        all_counts.extend_from_slice(&counts);
        all_packed.extend_from_slice(&packed);
    }
    out.extend_from_slice(&all_counts);
    out.extend_from_slice(&all_packed);
    Ok(out)
}

/// Write a layered PSD. `layers` go bottom to top and must all have the
/// dimensions of `composite`.
pub fn write_psd(
    w: &mut impl Write,
    layers: &[PsdLayer],
    composite: &RgbaImage,
    compression: ChannelCompression,
) -> Result<()> {
    let (width, height) = composite.dimensions();
    ensure!(
        (1..=MAX_DIMENSION).contains(&width) && (1..=MAX_DIMENSION).contains(&height),
        "document size {width}x{height} out of range"
    );
    for layer in layers {
        ensure!(
            layer.image.dimensions() == (width, height),
            "layer {:?} is {:?}, expected {width}x{height}",
            layer.name,
            layer.image.dimensions()
        );
    }

    w.write_all(SIGNATURE)?;
    write_u16(w, 1)?;
    w.write_all(&[0; 6])?;
    write_u16(w, 3)?;
    write_u32(w, height)?;
    write_u32(w, width)?;
    write_u16(w, 8)?;
    write_u16(w, COLOR_MODE_RGB)?;

    // color mode data, image resources
    write_u32(w, 0)?;
    write_u32(w, 0)?;

    let info = layer_info(layers, compression)?;
    let mut section = Vec::with_capacity(info.len() + 8);
    write_block(&mut section, &info)?;
    write_u32(&mut section, 0)?; // global layer mask
    write_block(w, &section)?;

    w.write_all(&merged_image(composite, compression)?)?;
    Ok(())
}

/// [`write_psd`] into a fresh buffer.
pub fn encode_psd(layers: &[PsdLayer], composite: &RgbaImage, compression: ChannelCompression) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_psd(&mut out, layers, composite, compression)?;
    Ok(out)
}
