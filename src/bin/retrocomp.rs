use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "retrocomp", version)]
struct Cli {
    /// Log at debug level.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a compositor script and write the final backbuffer as a PNG.
    Frame(FrameArgs),
    /// List the pixel formats the game screen accepts.
    Formats,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input script JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Backend to use.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    #[cfg(feature = "gpu")]
    Gpu,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Formats => cmd_formats(),
    }
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read script '{}'", args.in_path.display()))?;
    let script = retrocomp::Script::from_json(&text).with_context(|| "parse script JSON")?;

    let kind = match args.backend {
        BackendChoice::Cpu => retrocomp::BackendKind::Cpu,
        #[cfg(feature = "gpu")]
        BackendChoice::Gpu => retrocomp::BackendKind::Gpu,
    };
    let device = retrocomp::create_device(kind)?;
    let (frame, report) = script.render(device)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({} presented, {} dropped)",
        args.out.display(),
        report.presented,
        report.dropped
    );
    Ok(())
}

fn cmd_formats() -> anyhow::Result<()> {
    for format in retrocomp::PixelFormat::supported() {
        println!(
            "{:<10} {} byte(s)/pixel{}",
            format.to_string(),
            format.bpp(),
            if format.has_alpha() { ", alpha" } else { "" }
        );
    }
    Ok(())
}
