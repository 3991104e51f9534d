//! session-lock binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use session_lock::cli::{self, Command};
use session_lock::config::Config;
use session_lock::{
    logging, KeyValueStore, SessionHandler, SessionId, SessionLifecycle, SessionLockError,
};
use tracing::info;

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'session-lock --help' for more information.");
            return ExitCode::from(1);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };

    logging::try_init_with(Some(config.log_filter())).ok();

    let Some(command) = args.command else {
        cli::print_help();
        return ExitCode::from(1);
    };

    match run(&config, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Session(e)) if e.is_recoverable() => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] session_lock::config::ConfigError),
    #[error(transparent)]
    Session(#[from] SessionLockError),
}

fn run(config: &Config, command: Command) -> Result<(), RunError> {
    let store = open_store(&config.store.url)?;
    let mut handler = SessionHandler::new(store, config.to_handler_config()?)?;

    match command {
        Command::Read { id } => {
            let data = handler.read(&SessionId::new(id))?;
            println!("{}", String::from_utf8_lossy(&data));
        }
        Command::Write { id, data } => {
            let id = SessionId::new(id);
            handler.read(&id)?;
            handler.write(&id, data.as_bytes())?;
            info!("Wrote {} bytes to session {}", data.len(), id);
        }
        Command::Destroy { id } => {
            let id = SessionId::new(id);
            handler.read(&id)?;
            handler.destroy(&id)?;
            info!("Destroyed session {}", id);
        }
        Command::Hold { id, duration } => {
            let id = SessionId::new(id);
            handler.read(&id)?;
            info!("Holding lock on session {} for {:?}", id, duration);
            std::thread::sleep(duration);
        }
    }

    handler.close()?;
    Ok(())
}

#[cfg(feature = "redis-backend")]
fn open_store(url: &str) -> session_lock::Result<Arc<dyn KeyValueStore>> {
    let store = session_lock::RedisStore::connect(url)?;
    info!("Using redis store at {}", url);
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-backend"))]
fn open_store(_url: &str) -> session_lock::Result<Arc<dyn KeyValueStore>> {
    tracing::warn!("Built without redis-backend; using a process-local memory store");
    Ok(Arc::new(session_lock::MemoryStore::new()))
}
