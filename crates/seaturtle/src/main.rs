use std::{path::PathBuf, process::exit};

use clap::Parser;
use seaturtle::{Event, Recorder};

#[derive(Parser)]
#[command(about = "Check or run a SeaTurtle script, printing the turtle events it produces")]
struct Args {
    input: PathBuf,

    /// Only parse the script, don't run it.
    #[arg(long)]
    check: bool,

    /// Print the token stream before parsing.
    #[arg(long)]
    tokens: bool,
}

fn report(input: &str, e: &seaturtle::Error) -> ! {
    let (line, col) = e.location(input);
    let span = e.span();
    println!("Error at {line}:{col}: {e}");
    if !span.is_empty() {
        println!("    {}", span.slice(input));
    }
    exit(1);
}

pub fn main() {
    pretty_env_logger::init();
    let args = Args::parse();
    let input = match std::fs::read_to_string(&args.input) {
        Ok(x) => x,
        Err(e) => {
            println!(
                "Failed to open input file {}: {}",
                args.input.into_os_string().to_string_lossy(),
                e
            );
            exit(1);
        }
    };

    if args.tokens {
        match seaturtle::tokenize(&input) {
            Ok(tokens) => {
                for tok in tokens {
                    println!("{}: {}", tok.span.line(&input), tok.kind);
                }
            }
            Err(e) => report(&input, &e.into()),
        }
    }

    let program = match seaturtle::parse(&input) {
        Ok(prog) => prog,
        Err(e) => report(&input, &e),
    };
    if args.check {
        println!("OK ({} top-level statements)", program.len());
        return;
    }

    let mut recorder = Recorder::default();
    let res = seaturtle::interpret(&mut recorder, &program);
    for (event, span) in &recorder.events {
        let line = span.line(&input);
        match event {
            Event::Log(text) => println!("{text}"),
            Event::Turn(angle) => println!("{line}: turn {angle}"),
            Event::Move(dist) => println!("{line}: move {dist}"),
            Event::Home => println!("{line}: home"),
            Event::Pen(true) => println!("{line}: pen down"),
            Event::Pen(false) => println!("{line}: pen up"),
            Event::Color(c) => println!("{line}: color {c}"),
            Event::Var(name, val) => println!("{line}: {name} = {val}"),
        }
    }
    log::info!("{} events", recorder.events.len());
    if let Err(e) = res {
        report(&input, &e.into());
    }
}
