use std::path::{Path, PathBuf};

use anyhow::Context;
use asekit::{Document, Image, ImportOptions, export_frames};
use clap::{Parser, Subcommand};
use itertools::Itertools;

fn load_document(path: &Path) -> anyhow::Result<Document> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let doc = Document::parse(&bytes)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(doc)
}

fn save_png(image: &Image, path: &Path) -> anyhow::Result<()> {
    let mut out = image::RgbaImage::new(image.width(), image.height());
    for y in 0..image.height() {
        for x in 0..image.width() {
            let pixel = image.pixel(x, y);
            out.put_pixel(x, y, image::Rgba([pixel.r, pixel.g, pixel.b, pixel.a]));
        }
    }
    out.save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Prints a summary of a document: canvas, layers, tags, and slices.
#[derive(Parser)]
struct Info {
    /// Path to the Aseprite file.
    #[clap(index = 1)]
    file: PathBuf,
}

impl Info {
    fn run(&self) -> anyhow::Result<()> {
        let doc = load_document(&self.file)?;
        let header = &doc.header;
        println!(
            "{}x{} {:?}, {} frame(s)",
            header.width,
            header.height,
            header.depth,
            doc.frames.len()
        );

        println!("layers:");
        for (index, layer) in doc.layers.iter().enumerate() {
            let indent = "  ".repeat(usize::from(layer.child_level) + 1);
            let visibility = if doc.layer_visible(index) { "" } else { " (hidden)" };
            println!(
                "{indent}{:?} {:?} blend={:?}{visibility}",
                layer.name, layer.layer_type, layer.blend_mode
            );
        }

        if !doc.tags.is_empty() {
            println!("tags:");
            for tag in &doc.tags {
                println!(
                    "  {:?} frames {}..={} {:?}",
                    tag.name, tag.from_frame, tag.to_frame, tag.direction
                );
            }
        }

        if !doc.slices.is_empty() {
            println!("slices:");
            for slice in &doc.slices {
                println!("  {:?} ({} key(s))", slice.name, slice.keys.len());
            }
        }

        Ok(())
    }
}

/// Composites every frame and writes one PNG per frame.
#[derive(Parser)]
struct Export {
    /// Path to the Aseprite file.
    #[clap(index = 1)]
    file: PathBuf,
    /// Directory to write the frame PNGs into.
    #[clap(short = 'o', long, default_value = ".")]
    out_dir: PathBuf,
    /// Keep palette indices instead of resolving them to colors.
    #[clap(long)]
    indexed: bool,
    /// Keep transparent borders instead of trimming them.
    #[clap(long)]
    no_trim: bool,
}

impl Export {
    fn run(&self) -> anyhow::Result<()> {
        let doc = load_document(&self.file)?;
        let stem = self
            .file
            .file_stem()
            .map_or_else(|| "frame".into(), |stem| stem.to_string_lossy());

        std::fs::create_dir_all(&self.out_dir)?;
        for frame in 0..doc.frames.len() {
            let mut image = asekit::composite(&doc, frame, self.indexed);
            if !self.no_trim {
                image = image.trim();
            }
            let path = self.out_dir.join(format!("{stem}_{frame:03}.png"));
            save_png(&image, &path)?;
            println!("wrote {}", path.display());
        }
        Ok(())
    }
}

/// Packs the deduplicated frames into an atlas PNG and prints the placements.
#[derive(Parser)]
struct Pack {
    /// Path to the Aseprite file.
    #[clap(index = 1)]
    file: PathBuf,
    /// Path of the atlas PNG to write.
    #[clap(short = 'o', long, default_value = "atlas.png")]
    output: PathBuf,
    /// Pixel spacing between packed frames.
    #[clap(long, default_value = "0")]
    margin: u32,
    /// Flip each frame vertically before packing.
    #[clap(long)]
    flip: bool,
    /// Keep duplicate frames instead of collapsing them.
    #[clap(long)]
    no_dedup: bool,
    /// Keep transparent borders instead of trimming them.
    #[clap(long)]
    no_trim: bool,
}

impl Pack {
    fn run(&self) -> anyhow::Result<()> {
        let doc = load_document(&self.file)?;
        let options = ImportOptions {
            trim: !self.no_trim,
            flip: self.flip,
            dedup: !self.no_dedup,
            atlas_margin: self.margin,
            ..ImportOptions::default()
        };
        let frames = export_frames(&doc, &options);
        let packing = &frames.packing;

        let mut atlas = image::RgbaImage::new(packing.width, packing.height);
        for (source, rect) in frames.images.iter().zip(&packing.rects) {
            for y in 0..source.height() {
                for x in 0..source.width() {
                    let pixel = source.pixel(x, y);
                    atlas.put_pixel(
                        rect.x as u32 + x,
                        rect.y as u32 + y,
                        image::Rgba([pixel.r, pixel.g, pixel.b, pixel.a]),
                    );
                }
            }
        }
        atlas
            .save(&self.output)
            .with_context(|| format!("failed to write {}", self.output.display()))?;

        println!(
            "wrote {} ({}x{}, {} image(s))",
            self.output.display(),
            packing.width,
            packing.height,
            frames.images.len()
        );
        for (image_index, rect) in packing.rects.iter().enumerate() {
            let frames_using = frames
                .frame_map
                .iter()
                .enumerate()
                .filter(|&(_, &mapped)| mapped == image_index)
                .map(|(frame, _)| frame)
                .join(", ");
            println!(
                "  image {image_index}: x={} y={} {}x{} frames [{frames_using}]",
                rect.x, rect.y, rect.width, rect.height
            );
        }
        Ok(())
    }
}

/// The command to run.
#[derive(Subcommand)]
enum Command {
    #[clap(about = "Prints a summary of a document.")]
    Info(Info),
    #[clap(about = "Composites every frame and writes one PNG per frame.")]
    Export(Export),
    #[clap(about = "Packs the deduplicated frames into an atlas PNG.")]
    Pack(Pack),
}

impl Command {
    fn run(&self) -> anyhow::Result<()> {
        match self {
            Command::Info(info) => info.run(),
            Command::Export(export) => export.run(),
            Command::Pack(pack) => pack.run(),
        }
    }
}

/// A command line tool for inspecting and exporting Aseprite documents.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// The command to run.
    #[clap(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(&self) -> anyhow::Result<()> {
        self.command.run()
    }
}
