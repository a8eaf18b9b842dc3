use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use kurbo::Rect;
use seaturtle_host::{Canvas, Config};

#[derive(Parser, Debug)]
#[command(about = "Run a SeaTurtle script and save its drawing as SVG")]
struct Args {
    input: PathBuf,

    #[arg(short, long, default_value = "turtle.svg")]
    output: PathBuf,

    #[arg(long, default_value_t = 400.0)]
    width: f64,

    #[arg(long, default_value_t = 400.0)]
    height: f64,

    #[arg(long, default_value_t = 1.0)]
    line_width: f64,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();
    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let config = Config {
        rect: Rect::from_center_size((0.0, 0.0), (args.width, args.height)),
        line_width: args.line_width,
        ..Config::default()
    };
    let mut canvas = Canvas::new(config);
    let res = canvas.load(&source);
    // Whatever ran before an error still gets drawn.
    canvas.finish();
    for line in canvas.output() {
        println!("{line}");
    }
    canvas.save_svg(&args.output)?;
    log::info!(
        "wrote {} strokes to {}",
        canvas.strokes().len(),
        args.output.display()
    );

    res.map_err(|e| {
        let (line, col) = e.location(&source);
        anyhow!("error at {line}:{col}: {e}")
    })
}
