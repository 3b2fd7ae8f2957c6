use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use controller_manager::{ControllerFactory, ControllerManager};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use gpio_ctl::hal::pigpiod::PigpiodFactory;
use gpio_ctl::hal::sim::{SimBoard, SimFactory};
use gpio_ctl::hal::PinController;
use gpio_ctl::icd::{CommandRecord, Request, Response, ARG_ABSENT};
use gpio_ctl::{logging, Backend, Config, Dispatcher};
use tracing::{info, warn};

/// How long the signal handler waits for the controller to be released.
/// An edge wait without a timeout holds the controller until an edge.
const RELEASE_GRACE: Duration = Duration::from_secs(2);

const COMMANDS: &str = "\
Command codes (cmd <code> <pin> [arg]):
  0  read            -> level 0/1, or a negative hardware code
  1  write           arg 0|1
  2  pwm             arg duty 0..=1024
  3  set-direction   arg 0 input, 1 output
  4  set-pull        arg -1 down, 0 none, 1 up
  5  wait-edge       arg timeout ms, -1 forever -> 1 edge, 0 timeout, -1 error

Pins are BCM numbers 0..=53. PWM and edge waits only work on 0..=31.";

#[derive(Parser)]
#[command(
    name = "gpio-ctl",
    version,
    about = "Read, write, PWM and edge-wait on Raspberry Pi GPIO pins",
    after_long_help = COMMANDS
)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pin controller backend: pigpiod or sim
    #[arg(short, long, global = true)]
    backend: Option<Backend>,

    /// pigpio daemon host
    #[arg(long, global = true)]
    host: Option<String>,

    /// pigpio daemon port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Log filter, e.g. `debug` or `gpio_ctl=trace`
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the board revision
    Revision,
    /// Run one command record
    #[command(allow_negative_numbers = true)]
    Cmd {
        /// Command code, see --help
        code: i32,
        /// BCM pin number
        pin: i32,
        /// Command argument; omitted means absent
        arg: Option<i32>,
    },
    /// Answer JSON-lines requests from stdin on stdout
    Serve,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env().context("reading pigpio environment")?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(host) = cli.host {
        config.pigpiod.host = host;
    }
    if let Some(port) = cli.port {
        config.pigpiod.port = port;
    }

    logging::init(cli.log.as_deref(), config.log.as_deref());
    info!(backend = %config.backend, "starting");

    match config.backend {
        Backend::Sim => {
            run::<SimFactory>(SimBoard::new(config.sim), &cli.command)
        }
        Backend::Pigpiod => run::<PigpiodFactory>(config.pigpiod, &cli.command),
    }
}

fn run<F>(config: F::Config, command: &Command) -> anyhow::Result<()>
where
    F: ControllerFactory + 'static,
    F::Config: Send,
    F::Controller: PinController,
    F::Error: fmt::Display + Send,
{
    let manager: Arc<ControllerManager<CriticalSectionRawMutex, F>> =
        Arc::new(ControllerManager::new(config));
    install_release_handler(Arc::clone(&manager))?;

    let _release = manager.release_on_drop();
    let mut dispatcher = Dispatcher::new(Arc::clone(&manager));

    match *command {
        Command::Revision => {
            let response = dispatcher.dispatch(Request::QueryRevision)?;
            print_response(response);
        }
        Command::Cmd { code, pin, arg } => {
            let record =
                CommandRecord::with_arg(code, pin, arg.unwrap_or(ARG_ABSENT));
            let response = dispatcher.dispatch(record.into())?;
            print_response(response);
        }
        Command::Serve => {
            let handled =
                gpio_ctl::serve(&mut dispatcher, io::stdin().lock(), io::stdout())
                    .context("serving requests")?;
            info!(handled, "done");
        }
    }
    Ok(())
}

fn print_response(response: Response) {
    if let Some(value) = response.value() {
        println!("{value}");
    }
}

/// Release the controller on SIGINT/SIGTERM, then exit.
fn install_release_handler<F>(
    manager: Arc<ControllerManager<CriticalSectionRawMutex, F>>,
) -> anyhow::Result<()>
where
    F: ControllerFactory + 'static,
    F::Config: Send,
    F::Controller: Send,
    F::Error: fmt::Display + Send,
{
    ctrlc::set_handler(move || {
        let (done_tx, done_rx) = mpsc::channel();
        let manager = Arc::clone(&manager);
        std::thread::spawn(move || {
            let _ = done_tx.send(manager.release());
        });

        match done_rx.recv_timeout(RELEASE_GRACE) {
            Ok(Ok(())) => info!("controller released"),
            Ok(Err(err)) => warn!(%err, "controller release failed"),
            Err(_) => warn!("controller still busy, exiting without release"),
        }
        std::process::exit(130);
    })
    .context("installing signal handler")
}
