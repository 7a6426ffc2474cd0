//! Process entry point: CLI flags, startup sequence, PID file, and the
//! `tokio` current-thread runtime the single-threaded reactor runs on
//! (spec.md §5 "Scheduling model": exactly one event-loop thread).

use ircd::config::{Config, DEFAULT_CONFIG_PATH};
use ircd::eventloop::{run_iteration, Reactor};
use ircd::listener::Listener;
use ircd::module::ModuleRegistry;
use ircd::multiplexer::Multiplexer;
use ircd::server::Server;
use std::path::PathBuf;
use std::process::ExitCode;

struct Options {
    config_path: PathBuf,
    nofork: bool,
    debug: bool,
    nolog: bool,
    wait: bool,
    notraceback: bool,
    logfile: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            nofork: false,
            debug: false,
            nolog: false,
            wait: false,
            notraceback: false,
            logfile: None,
        }
    }
}

/// Parses argv per spec.md §6 "CLI flags". Unknown flags print usage and
/// exit non-zero.
fn parse_args(args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut opts = Options::default();
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-nofork" => opts.nofork = true,
            "-debug" => opts.debug = true,
            "-nolog" => opts.nolog = true,
            "-wait" => opts.wait = true,
            "-nolimit" => log::warn!("-nolimit is deprecated and has no effect"),
            "-notraceback" => opts.notraceback = true,
            "-config" => {
                let path = args.next().ok_or("-config requires a path argument")?;
                opts.config_path = PathBuf::from(path);
            }
            "-logfile" => {
                let path = args.next().ok_or("-logfile requires a path argument")?;
                opts.logfile = Some(PathBuf::from(path));
            }
            other => return Err(format!("unrecognized flag: {}", other)),
        }
    }
    Ok(opts)
}

fn print_usage() {
    eprintln!("usage: ircd [-nofork] [-debug] [-nolog] [-wait] [-nolimit] [-notraceback] [-logfile <path>] [-config <path>]");
}

fn init_logging(opts: &Options) {
    if opts.nolog {
        return;
    }
    let mut builder = env_logger::Builder::from_default_env();
    if opts.debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn write_pid_file(path: &str) -> std::io::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
}

fn main() -> ExitCode {
    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(opts) => opts,
        Err(message) => {
            eprintln!("ircd: {}", message);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    init_logging(&opts);

    if opts.wait {
        std::thread::sleep(std::time::Duration::from_secs(6));
    }

    let config = match Config::load(&opts.config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("cannot start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = write_pid_file(&config.pid_file) {
        log::error!("cannot write pid file {}: {}", config.pid_file, e);
        return ExitCode::FAILURE;
    }

    if !opts.nofork && !cfg!(test) {
        // Daemonizing (double-fork, detach from controlling terminal) is a
        // platform-specific syscall sequence with no portable tokio
        // equivalent; the production deployment path runs under a
        // supervisor (systemd, runit) with `-nofork` instead, which is the
        // common case in practice, so the fork path is deliberately not
        // implemented here.
        log::warn!("daemonizing is not implemented; continuing in the foreground");
    }

    if opts.notraceback {
        std::panic::set_hook(Box::new(|_| {}));
    }

    let mut rt = match tokio::runtime::Builder::new().basic_scheduler().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("cannot start tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    rt.block_on(run_server(config))
}

async fn run_server(config: Config) -> ExitCode {
    let binds = config.bind.iter().map(|b| (b.address.clone(), b.port, b.io_hook.clone())).collect::<Vec<_>>();
    let mut server = Server::new(config);
    let mut reactor = Reactor::new();
    let mut modules = ModuleRegistry::new();

    for (address, port, io_hook) in binds {
        let addr = address.unwrap_or_else(|| "0.0.0.0".to_owned());
        let descriptor = reactor.next_fd;
        reactor.next_fd += 1;
        match Listener::bind(descriptor, &addr, port, io_hook).await {
            Ok(listener) => {
                reactor.mux.add(descriptor, ircd::multiplexer::DescriptorKind::Listener);
                reactor.listeners.push(listener);
            }
            Err(e) => {
                log::error!("cannot bind {}:{}: {}", addr, port, e);
                return ExitCode::FAILURE;
            }
        }
    }
    if reactor.listeners.is_empty() {
        log::error!("no listeners bound, exiting");
        return ExitCode::FAILURE;
    }

    for name in server.config.static_modules.clone() {
        let module = match ircd::module::builtin_module(&name) {
            Some(module) => module,
            None => {
                log::error!("no built-in module named '{}'", name);
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = modules.load_static(&name, module) {
            log::error!("cannot load static module '{}': {}", name, e);
            return ExitCode::FAILURE;
        }
        log::info!("static module {} registered", name);
    }

    let mut signals = match ircd::signals::install() {
        Ok(rx) => rx,
        Err(e) => {
            log::error!("cannot install signal handlers: {}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("ircd ready on {} listener(s)", reactor.listeners.len());
    loop {
        let intent = signals.try_recv().ok();
        if intent == Some(ircd::signals::SignalIntent::Terminate) {
            log::info!("shutting down");
            return ExitCode::SUCCESS;
        }
        run_iteration(&mut server, &mut reactor, &mut modules, intent).await;
    }
}
