use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wavegram::{PipelineOpts, Toolchain, WaveformPipeline, image_width_for, probe_source};

#[derive(Parser, Debug)]
#[command(name = "wavegram", version)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a waveform PNG (requires `ffmpeg`, `ffprobe` and `gnuplot`).
    Render(RenderArgs),
    /// Print the duration of the first audio stream and the image width it maps to.
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
struct ToolArgs {
    /// `gnuplot` executable (default: $WAVEGRAM_GNUPLOT, `gnuplot`, then `gnuplot-nox`).
    #[arg(long)]
    gnuplot: Option<PathBuf>,

    /// `ffmpeg` executable.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// `ffprobe` executable.
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Abort the run after this many seconds.
    #[arg(long)]
    timeout_secs: Option<f64>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Local audio file or http(s) URL.
    input: String,

    /// Output PNG path.
    output: PathBuf,

    /// Skip checking the produced PNG's dimensions.
    #[arg(long, default_value_t = false)]
    no_verify: bool,

    #[command(flatten)]
    tools: ToolArgs,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Local audio file or http(s) URL.
    input: String,

    #[command(flatten)]
    tools: ToolArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "wavegram=debug" } else { "wavegram=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn pipeline_opts(tools: &ToolArgs) -> anyhow::Result<PipelineOpts> {
    let mut toolchain = match &tools.gnuplot {
        Some(p) => Toolchain::default().with_plotter(p),
        None => Toolchain::detect(),
    };
    if let Some(p) = &tools.ffmpeg {
        toolchain = toolchain.with_ffmpeg(p);
    }
    if let Some(p) = &tools.ffprobe {
        toolchain = toolchain.with_ffprobe(p);
    }

    let mut opts = PipelineOpts::new(toolchain);
    if let Some(secs) = tools.timeout_secs {
        let timeout = Duration::try_from_secs_f64(secs)
            .map_err(|e| anyhow::anyhow!("invalid --timeout-secs {secs}: {e}"))?;
        opts = opts.with_timeout(timeout);
    }
    Ok(opts)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let opts = pipeline_opts(&args.tools)?.with_verify_output(!args.no_verify);
    WaveformPipeline::new(opts).run(&args.input, &args.output)?;
    eprintln!("wrote {}", args.output.display());
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let opts = pipeline_opts(&args.tools)?;
    let duration = probe_source(&opts, &args.input)?;
    match image_width_for(duration) {
        Ok(width) => println!("{duration}\t{width}"),
        Err(e) => println!("{duration}\t-\t({e})"),
    }
    Ok(())
}
