#![deny(unsafe_code)]
pub mod commands;
mod version;

use anyhow::{Result, bail};
use clap::Parser;
use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Custom styles for CLI help output
const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());
use commands::cat::Cat;
use commands::command::Command;
use commands::count::Count;
use enum_dispatch::enum_dispatch;
use env_logger::Env;
use linestream_thread::startup::set_thread_stack_size;
use log::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(styles = STYLES, version = version::VERSION.as_str())]
struct Args {
    /// Stack size, in bytes, for background and pool threads
    #[arg(long = "thread-stack", global = true)]
    thread_stack: Option<usize>,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[enum_dispatch(Command)]
#[derive(Parser, Debug)]
enum Subcommand {
    #[command(display_order = 1)]
    Count(Count),
    #[command(display_order = 2)]
    Cat(Cat),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(bytes) = args.thread_stack {
        if set_thread_stack_size(bytes).is_err() {
            bail!("Thread stack size was already configured");
        }
    }

    info!("Running linestream version {}", version::VERSION.as_str());
    args.subcommand.execute()
}
