use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::info;
use rand::{SeedableRng, rngs::StdRng};

use sortnet::{cpu::CpuDevice, device::StageDevice, engine::Sorter};

/// Steps through a bitonic sort and renders the array as a heat map
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Number of elements (a power of two, at least 4)
    #[clap(short, long, default_value_t = 16)]
    size: usize,

    /// Seed for shuffling the array (random if not provided)
    #[clap(long)]
    seed: Option<u64>,

    /// Number of stages to execute
    #[clap(short = 'n', long, default_value_t = 1)]
    steps: usize,

    /// Run the sort to completion (overrides `--steps`)
    #[clap(long)]
    run: bool,

    /// Device used to execute stages
    #[clap(short, long, value_enum, default_value_t = Backend::Cpu)]
    backend: Backend,

    /// Cell to highlight, as `X,Y` in grid coordinates
    #[clap(long, value_parser = parse_cell)]
    hover: Option<(usize, usize)>,

    /// Name of a `.png` file to write
    #[clap(short, long)]
    out: Option<PathBuf>,

    /// Size of each cell in the output image, in pixels
    #[clap(long, default_value_t = 16)]
    scale: usize,

    /// Print the array after every stage
    #[clap(long)]
    log_elements: bool,
}

#[derive(ValueEnum, Clone)]
enum Backend {
    Cpu,

    #[cfg(feature = "wgpu")]
    Wgpu,
}

fn parse_cell(s: &str) -> Result<(usize, usize), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `X,Y`, got `{s}`"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid coordinate `{v}`: {e}"))
    };
    Ok((parse(x)?, parse(y)?))
}

////////////////////////////////////////////////////////////////////////////////

fn run<D: StageDevice>(device: D, args: &Args) -> Result<()> {
    let mut sorter = Sorter::new(device, args.size)?;
    let mut rng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    sorter.randomize(&mut rng)?;
    if args.log_elements {
        info!("initial: {:?}", sorter.elements().as_slice());
    }

    let steps = if args.run { usize::MAX } else { args.steps };
    let start = Instant::now();
    let mut count = 0;
    while count < steps && !sorter.is_complete() {
        let stage = sorter.step()?;
        count += 1;
        info!("executed {stage}; {}", sorter.status());
        if args.log_elements {
            info!("elements: {:?}", sorter.elements().as_slice());
        }
    }
    info!(
        "ran {count} stages in {:?} ({})",
        start.elapsed(),
        if sorter.is_complete() {
            "complete"
        } else {
            "incomplete"
        }
    );
    if sorter.is_complete() && !sorter.elements().is_sorted() {
        bail!("network completed but the array is not sorted");
    }

    let layout = sorter.config().layout();
    let hovered = match args.hover {
        Some((x, y)) => match layout.cell_at(x, y) {
            Some(i) => Some(i),
            None => bail!(
                "cell ({x}, {y}) is outside the {}x{} grid",
                layout.width,
                layout.height
            ),
        },
        None => None,
    };
    let frame = sorter.frame(hovered);
    if let (Some(h), Some(s)) = (frame.hovered, frame.swapped) {
        info!(
            "cell {h} (value {}) is compared with cell {s} (value {}) next",
            frame.elements[h], frame.elements[s]
        );
    }

    if let Some(out) = &args.out {
        let scale = args.scale.max(1);
        let (width, height) = frame.image_size(scale);
        info!("Writing image to {out:?}");
        image::save_buffer(
            out,
            &frame.heatmap(scale),
            width as u32,
            height as u32,
            image::ColorType::Rgba8,
        )?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let args = Args::parse();
    match args.backend {
        Backend::Cpu => run(CpuDevice::new(), &args),
        #[cfg(feature = "wgpu")]
        Backend::Wgpu => {
            let now = Instant::now();
            let device = sortnet::wgpu::WgpuDevice::new()?;
            info!("Built WGPU device in {:?}", now.elapsed());
            run(device, &args)
        }
    }
}
