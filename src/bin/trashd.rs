//! Multi-command trash tool: `list|unlink|shred|restore|cleanup`, plus
//! `--serve` to keep the Peer Transport alive so this process participates
//! in propagation while idle.

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use libtrash::{
    Action, Command, Config, CustomMapping, DirectoryList, Job, JobListener, Router, Scheduler,
    Transport,
};

const BINARY_NAME: &str = "trashd";
const EXITCODE_OK: i32 = 0;
const EXITCODE_INVALID_ARGS: i32 = 1;
const EXITCODE_INTERNAL: i32 = 2;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let serve = take_flag(&mut args, "--serve");

    if args.is_empty() {
        msg_err("missing command");
        print_help();
        std::process::exit(EXITCODE_INVALID_ARGS);
    }

    let config = Config::from_env();

    let transport = if serve {
        match Transport::bind(config.clone(), local_hostname()) {
            Ok(t) => Some(Arc::new(t)),
            Err(e) => {
                msg_err(format!("cannot start peer transport: {e}"));
                std::process::exit(EXITCODE_INTERNAL);
            }
        }
    } else {
        None
    };

    let mut router = match Router::new(CustomMapping::empty(), DirectoryList::empty()) {
        Ok(v) => v,
        Err(e) => {
            msg_err(format!("cannot set up trash router: {e}"));
            std::process::exit(EXITCODE_INTERNAL);
        }
    };

    let home_base = router.home_base().to_path_buf();
    if let Some(transport) = &transport {
        let transport = Arc::clone(transport);
        let cb_home_base = home_base.clone();
        router = router.with_usage_callback(move |usage| transport.announce(&cb_home_base, &usage));
    }
    let router = Arc::new(router);

    let listener = Arc::new(PropagatingListener::new(transport.clone(), home_base));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&router),
        listener.clone(),
        config.max_threads,
    ));

    let command = args.remove(0);
    let exit_code = match command.as_str() {
        "list" => run_list(&router),
        "unlink" => run_dispatch(&scheduler, &listener, &args, Action::Unlink),
        "shred" => run_dispatch(&scheduler, &listener, &args, Action::Shred),
        "restore" => run_dispatch(&scheduler, &listener, &args, Action::Restore),
        "cleanup" => run_dispatch(&scheduler, &listener, &["all".to_string()], Action::Cleanup),
        "help" => {
            print_help();
            EXITCODE_OK
        }
        _ => {
            msg_err(format!("unsupported command: {command}"));
            EXITCODE_INVALID_ARGS
        }
    };

    if let Some(transport) = transport {
        run_server(scheduler, transport, &config);
    }

    std::process::exit(exit_code);
}

/// Reports job outcomes back to the CLI and, when a transport is attached,
/// propagates completed actions to peers. Mirrors the original tool's
/// scheduler-driven `MessageListener`, rather than returning `Result`
/// synchronously to the caller.
struct PropagatingListener {
    transport: Option<Arc<Transport>>,
    home_base: PathBuf,
    failures: AtomicUsize,
}

impl PropagatingListener {
    fn new(transport: Option<Arc<Transport>>, home_base: PathBuf) -> Self {
        PropagatingListener {
            transport,
            home_base,
            failures: AtomicUsize::new(0),
        }
    }

    fn failure_count(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl JobListener for PropagatingListener {
    fn on_end_action(&self, job: &Job, result_key: Option<&str>) {
        let Some(key) = result_key else {
            msg(format!("{} done", action_verb(job.action)));
            return;
        };

        msg(format!("{} '{key}'", action_verb(job.action)));

        let Some(transport) = &self.transport else {
            return;
        };
        let command = match job.action {
            Action::Add => Command::Add,
            Action::Unlink | Action::Shred | Action::Restore => Command::Remove,
            Action::Cleanup => return,
        };
        transport.post_event(&self.home_base, command, key);
    }

    fn on_cancel(&self, job: &Job) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        msg_err(format!("cannot process '{}'", job.target));
    }
}

fn action_verb(action: Action) -> &'static str {
    match action {
        Action::Add => "added",
        Action::Unlink => "unlinked",
        Action::Shred => "shredded",
        Action::Restore => "restored",
        Action::Cleanup => "cleaned up",
    }
}

fn run_server(scheduler: Arc<Scheduler>, transport: Arc<Transport>, config: &Config) {
    msg(format!("listening on port {}", transport.port));
    let workers = scheduler.run_workers();
    let dispatch = transport.run_dispatch_thread();

    if config.one_network_thread {
        transport.run_single_thread();
    } else {
        let (read_handle, write_handle) = transport.run_two_thread();
        let _ = read_handle.join();
        let _ = write_handle.join();
    }

    scheduler.close();
    for worker in workers {
        let _ = worker.join();
    }
    let _ = dispatch.join();
}

fn run_list(router: &Router) -> i32 {
    for item in router.all_items() {
        println!(
            "{}\t{}\t{}",
            item.trashname,
            item.original_path.display(),
            item.deletion_time.format("%Y-%m-%dT%H:%M:%S")
        );
    }
    EXITCODE_OK
}

/// Schedules a job per `target` (or the single `Cleanup` target) and drains
/// it synchronously through the scheduler, so a one-shot invocation still
/// goes through the same dedup/cancellation/propagation path `--serve` uses.
fn run_dispatch(
    scheduler: &Scheduler,
    listener: &PropagatingListener,
    targets: &[String],
    action: Action,
) -> i32 {
    if targets.is_empty() {
        msg_err("missing trash key");
        return EXITCODE_INVALID_ARGS;
    }

    for target in targets {
        match scheduler.schedule(Job::new(action, target.clone())) {
            Ok(()) => {
                if let Err(e) = scheduler.execute_next() {
                    msg_err(format!("scheduler error: {e}"));
                    return EXITCODE_INTERNAL;
                }
            }
            Err(e) => {
                msg_err(format!("cannot schedule '{target}': {e}"));
                return EXITCODE_INTERNAL;
            }
        }
    }

    if listener.failure_count() > 0 {
        EXITCODE_INTERNAL
    } else {
        EXITCODE_OK
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn local_hostname() -> String {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

fn print_help() {
    println!(
        r#"
{BINARY_NAME} version {}
a freedesktop.org trash spec implementation: multi-repository management

Usage: {BINARY_NAME} [--serve] <command> [args...]

Commands:
    list                 list every trashed item across known repositories
    unlink <key>...       permanently remove item(s) without overwriting
    shred <key>...        overwrite then remove item(s)
    restore <key>...      restore item(s) to their original location
    cleanup               repair files/info bijection across all repositories
    help                 display this help and exit

A <key> is either a bare trashname (home repository) or
`trashname:/absolute/base` (a non-home repository).

--serve keeps this process listening for peer trash events after the
requested command runs, participating in propagation until killed.
"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn msg_err<T: std::fmt::Display>(msg: T) {
    eprintln!("{BINARY_NAME}: {msg}")
}

fn msg<T: std::fmt::Display>(msg: T) {
    println!("{BINARY_NAME}: {msg}")
}
