//! svelte-check-server CLI entry point

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError};

use svelte_check_server::cli::{CheckArgs, Cli, Commands, StartArgs, StopArgs};
use svelte_check_server::client::{Client, DEFAULT_TIMEOUT};
use svelte_check_server::runner::{run_once, run_svelte_kit_sync, Runner};
use svelte_check_server::server::CheckServer;
use svelte_check_server::socket::{socket_exists, socket_path_for_workspace};
use svelte_check_server::watch::{
    ChangeSupervisor, GitBranchWatcher, NotifyFsWatcher, SupervisorConfig,
};

/// How long graceful shutdown waits for in-flight requests.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signal: libc::c_int) {
    SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("svelte_check_server=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start(args) => cmd_start(args),
        Commands::Check(args) => cmd_check(args),
        Commands::Stop(args) => cmd_stop(args),
    }
}

/// `.` means "wherever the command ran"; the daemon and its clients must
/// agree on the same absolute workspace to derive the same socket.
fn resolve_workspace(workspace: &Path) -> Option<PathBuf> {
    if workspace == Path::new(".") {
        std::env::current_dir().ok()
    } else {
        Some(workspace.to_path_buf())
    }
}

fn cmd_start(args: StartArgs) -> ExitCode {
    let Some(workspace) = resolve_workspace(&args.workspace) else {
        tracing::error!("failed to resolve working directory");
        return ExitCode::FAILURE;
    };

    let mut recursive = args.recursive;
    let mut non_recursive = args.non_recursive;
    if recursive.is_empty() && non_recursive.is_empty() {
        non_recursive = vec![PathBuf::from(".")];
        recursive = vec![PathBuf::from("./src")];
    }

    let socket_path = match socket_path_for_workspace(&workspace) {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("failed to derive socket path: {e}");
            return ExitCode::FAILURE;
        }
    };
    if socket_exists(&socket_path) {
        tracing::error!(
            "server already running (socket exists at {})",
            socket_path.display()
        );
        return ExitCode::FAILURE;
    }

    let runner = Arc::new(Runner::new(&workspace, args.tsconfig.as_deref()));
    if let Err(e) = runner.start() {
        tracing::error!("failed to start svelte-check: {e}");
        return ExitCode::FAILURE;
    }

    let mut server = CheckServer::new(socket_path.clone(), Arc::clone(&runner));
    if let Err(e) = server.start() {
        runner.stop();
        tracing::error!("failed to start server: {e}");
        return ExitCode::FAILURE;
    }

    let fs_watcher = match NotifyFsWatcher::new() {
        Ok(watcher) => watcher,
        Err(e) => {
            let _ = server.stop(DRAIN_DEADLINE);
            runner.stop();
            tracing::error!("failed to create filesystem watcher: {e}");
            return ExitCode::FAILURE;
        }
    };

    let git_watcher = match GitBranchWatcher::new(&workspace) {
        Ok(watcher) => watcher,
        Err(e) => {
            let _ = server.stop(DRAIN_DEADLINE);
            runner.stop();
            tracing::error!("failed to create git branch watcher: {e}");
            return ExitCode::FAILURE;
        }
    };

    let restart_runner = Arc::clone(&runner);
    let on_restart = move || {
        tracing::info!("change detected, restarting svelte-check");
        if let Err(e) = restart_runner.restart() {
            tracing::error!("failed to restart svelte-check: {e}");
        }
    };
    let sync_workspace = workspace.clone();
    let on_sync = move || {
        tracing::info!("running svelte-kit sync");
        match run_svelte_kit_sync(&sync_workspace) {
            Ok(()) => tracing::info!("svelte-kit sync completed"),
            Err(e) => tracing::warn!("svelte-kit sync failed: {e}"),
        }
    };

    let config = SupervisorConfig {
        workspace: workspace.clone(),
        recursive_dirs: recursive.clone(),
        non_recursive_dirs: non_recursive.clone(),
    };
    let mut supervisor = ChangeSupervisor::new(
        config,
        Box::new(fs_watcher),
        Some(&git_watcher),
        on_restart,
        on_sync,
    );

    let (cancel_tx, cancel_rx) = bounded::<()>(0);
    let git_cancel = cancel_rx.clone();
    let mut git_watcher = git_watcher;
    let git_handle = thread::spawn(move || git_watcher.run(git_cancel));
    let supervisor_handle = thread::spawn(move || {
        supervisor.run(cancel_rx);
        supervisor.close();
    });

    install_signal_handlers();
    let shutdown_rx = server.shutdown_requested();

    tracing::info!("server started on {}", socket_path.display());
    tracing::info!(
        "watching directories: {non_recursive:?} (non-recursive), {recursive:?} (recursive)"
    );

    loop {
        if SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
            break;
        }
        match shutdown_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    tracing::info!("shutting down");
    drop(cancel_tx);
    let _ = supervisor_handle.join();
    let _ = git_handle.join();
    runner.stop();
    if let Err(e) = server.stop(DRAIN_DEADLINE) {
        tracing::warn!("error stopping server: {e}");
    }
    tracing::info!("server stopped");
    ExitCode::SUCCESS
}

fn cmd_check(args: CheckArgs) -> ExitCode {
    let Some(workspace) = resolve_workspace(&args.workspace) else {
        tracing::error!("failed to resolve working directory");
        return ExitCode::FAILURE;
    };

    let client = match Client::new(&workspace) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("failed to create client: {e}");
            return ExitCode::FAILURE;
        }
    };

    if !client.is_server_running() {
        tracing::info!("server not running, running svelte-check directly");
        let (output, code) = run_once(&workspace, args.tsconfig.as_deref());
        print!("{output}");
        return ExitCode::from(code.clamp(0, 255) as u8);
    }

    match client.check(args.format.as_str(), Duration::from_secs(args.timeout)) {
        Ok((output, has_errors)) => {
            print!("{output}");
            if !output.is_empty() && !output.ends_with('\n') {
                println!();
            }
            if has_errors {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!("failed to get check results: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_stop(args: StopArgs) -> ExitCode {
    let Some(workspace) = resolve_workspace(&args.workspace) else {
        tracing::error!("failed to resolve working directory");
        return ExitCode::FAILURE;
    };

    let client = match Client::new(&workspace) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("failed to create client: {e}");
            return ExitCode::FAILURE;
        }
    };

    if !client.is_server_running() {
        println!("Server is not running");
        return ExitCode::SUCCESS;
    }

    match client.stop(DEFAULT_TIMEOUT) {
        Ok(()) => {
            println!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("failed to stop server: {e}");
            ExitCode::FAILURE
        }
    }
}
