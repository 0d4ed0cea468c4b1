use std::env;
use std::error::Error;
use std::io::{stdin, stdout, Write};
use std::sync::Arc;

use libtrash::{Command, Config, CustomMapping, DirectoryList, RepoUsage, Router, Transport};

const BINARY_NAME: &str = "trash";

const EXITCODE_OK: i32 = 0;
const EXITCODE_INVALID_ARGS: i32 = 1;
const EXITCODE_UNSUPPORTED: i32 = 2;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // skip the binary name, and parse rest of the args
    let args: Vec<String> = env::args().skip(1).collect();
    let args_conf = match Args::parse(args) {
        Ok(v) => v,
        Err(e) => {
            msg_err(format!("{e}"));
            msg_err("try '-h' for more information.");
            std::process::exit(EXITCODE_INVALID_ARGS);
        }
    };

    if args_conf.version {
        let version = env!("CARGO_PKG_VERSION");
        let binary_name = env!("CARGO_PKG_NAME");
        println!("{binary_name} ({version})");
        std::process::exit(EXITCODE_OK);
    }

    if args_conf.help {
        print_help();
        std::process::exit(EXITCODE_OK);
    }

    let config = Config::from_env();

    // A transient listener: just enough of the Peer Transport to publish a
    // rendezvous file and post this run's `add` events to peers already
    // watching the affected repositories.
    let transport = match Transport::bind(config, local_hostname()) {
        Ok(t) => Some(Arc::new(t)),
        Err(e) => {
            log::debug!("cannot start peer transport, continuing without propagation: {e}");
            None
        }
    };

    let mut router = match Router::new(CustomMapping::empty(), DirectoryList::empty()) {
        Ok(v) => v,
        Err(e) => {
            msg_err(format!("cannot set up trash router: {e}"));
            std::process::exit(EXITCODE_UNSUPPORTED);
        }
    };

    let home_base = router.home_base().to_path_buf();
    if let Some(transport) = &transport {
        let transport = Arc::clone(transport);
        let cb_home_base = home_base.clone();
        router = router.with_usage_callback(move |usage| {
            if let RepoUsage::Top(base) = &usage {
                log::debug!("used non-home trash at '{}'", base.display());
            }
            transport.announce(&cb_home_base, &usage);
        });
    }

    for file_name in args_conf.file_names {
        if args_conf.interactive {
            print!("trash file '{file_name}'? (y/n): ");
            if let Err(e) = stdout().flush() {
                msg_err(format!("input/output error: {e}"));
                std::process::exit(EXITCODE_UNSUPPORTED);
            }

            let mut confirmation = String::new();
            if let Err(e) = stdin().read_line(&mut confirmation) {
                msg_err(format!("input/output error: {e}"));
                std::process::exit(EXITCODE_UNSUPPORTED);
            }
            if confirmation.trim().to_lowercase() != "y" {
                if args_conf.verbose {
                    msg_err("not trashing the file");
                }
                continue;
            }
        }

        match router.add(&file_name) {
            Ok((trashname, usage)) => {
                if args_conf.verbose {
                    let destination = match &usage {
                        RepoUsage::Home => "home trash".to_string(),
                        RepoUsage::Top(base) => format!("trash at '{}'", base.display()),
                    };
                    msg(format!("'{file_name}' moved to {destination} as '{trashname}'"));
                }

                if let Some(transport) = &transport {
                    let key = match usage {
                        RepoUsage::Home => trashname,
                        RepoUsage::Top(base) => format!("{trashname}:{}", base.display()),
                    };
                    transport.post_event(&home_base, Command::Add, &key);
                }
            }
            Err(e) => {
                msg_err(format!("cannot trash '{file_name}': {e}"));
                std::process::exit(EXITCODE_UNSUPPORTED);
            }
        }
    }

    // give the just-posted events a couple of ticks to actually leave the
    // socket before this short-lived process exits.
    if let Some(transport) = &transport {
        for _ in 0..3 {
            transport.pump();
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    }
}

fn print_help() {
    println!(
        r#"
{BINARY_NAME} version {}
a freedesktop.org trash spec implementation for the CLI

Usage: {BINARY_NAME} [OPTION]... [FILE]...
Move the FILE(s) to the trash bin without unlinking

    -h, --help          display this help and exit
    -i, --interactive   prompt before every move
    -v, --verbose       explain what is being done
    -V, --version       output version information and exit

{BINARY_NAME} does not traverse symbolic links. It will only move the link to
trash bin, not the target.

To trash a file whose name starts with a '-', for example '-foo',
use one of these commands:
  {BINARY_NAME} -- -foo

  {BINARY_NAME} ./-foo

To restore a trashed file, use `trashd restore <trashname>`, or any other
freedesktop.org trash specification compatible tool.
"#,
        env!("CARGO_PKG_VERSION")
    );
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

fn msg_err<T: std::fmt::Display>(msg: T) {
    eprintln!("{BINARY_NAME}: {msg}")
}

fn msg<T: std::fmt::Display>(msg: T) {
    println!("{BINARY_NAME}: {msg}")
}

#[derive(Debug, Clone)]
struct Args {
    interactive: bool, // -i, --interactive
    verbose: bool,     // -v, --verbose
    help: bool,        // -h, --help
    version: bool,     // -V, --version
    file_names: Vec<String>,
}

impl Args {
    fn parse(args: Vec<String>) -> Result<Self, Box<dyn Error>> {
        // need at least one arg
        if args.is_empty() {
            return Err(Box::<dyn Error>::from("missing operand"));
        }

        let mut interactive: bool = false;
        let mut verbose: bool = false;
        let mut help: bool = false;
        let mut version: bool = false;
        let mut file_names: Vec<String> = vec![];
        let mut eoo = false; // -- is end of options
        for arg in args {
            if eoo {
                file_names.push(arg);
            } else {
                match arg.as_str() {
                    "--" => eoo = true,
                    "-i" | "--interactive" => interactive = true,
                    "-v" | "--verbose" => verbose = true,
                    "-h" | "--help" => help = true,
                    "-V" | "--version" => version = true,
                    "-iv" | "-vi" => {
                        verbose = true;
                        interactive = true;
                    }
                    _ => {
                        if arg.starts_with('-') {
                            return Err(Box::<dyn Error>::from(format!(
                                "invalid option -- '{arg}'"
                            )));
                        }

                        file_names.push(arg);
                    }
                }
            }
        }

        if file_names.is_empty() && !(help || version) {
            return Err(Box::<dyn Error>::from("missing operand"));
        }

        Ok(Args {
            interactive,
            verbose,
            help,
            version,
            file_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let i: Vec<String> = vec![String::from("-iv"), String::from("somefile")];
        let args = Args::parse(i);
        assert!(args.is_ok());
        let a = args.unwrap();
        assert!(a.interactive && a.verbose && !a.help && !a.version);
        assert!(a.file_names.len() == 1);

        let i: Vec<String> = vec![String::from("-vi"), String::from("somefile")];
        let args = Args::parse(i);
        assert!(args.is_ok());
        let a = args.unwrap();
        assert!(a.interactive && a.verbose && !a.help && !a.version);

        let i: Vec<String> = vec![String::from("--verbose"), String::from("somefile")];
        let args = Args::parse(i);
        assert!(args.is_ok());
        let a = args.unwrap();
        assert!(!a.interactive && a.verbose && !a.help && !a.version);

        let i: Vec<String> = vec![String::from("-h")];
        let args = Args::parse(i);
        assert!(args.is_ok());
        let a = args.unwrap();
        assert!(!a.interactive && !a.verbose && a.help && !a.version);

        let i: Vec<String> = vec![String::from("-V")];
        let args = Args::parse(i);
        assert!(args.is_ok());
        let a = args.unwrap();
        assert!(!a.interactive && !a.verbose && !a.help && a.version);

        let i: Vec<String> = vec![
            String::from("-iv"),
            String::from("--"),
            String::from("-somefile"),
        ];
        let args = Args::parse(i);
        assert!(args.is_ok());
        let a = args.unwrap();
        assert!(a.interactive && a.verbose && !a.help && !a.version);
        assert!(a.file_names[0] == "-somefile");

        let i: Vec<String> = vec![
            String::from("--"),
            String::from("-iv"),
            String::from("-somefile"),
        ];
        let args = Args::parse(i);
        assert!(args.is_ok());
        let a = args.unwrap();
        assert!(!a.interactive && !a.verbose && !a.help && !a.version);
        assert!(a.file_names[0] == "-iv");
        assert!(a.file_names[1] == "-somefile");
    }

    #[test]
    fn test_parse_args_err() {
        let i: Vec<String> = vec![];
        let args = Args::parse(i);
        assert!(args.is_err());

        // need to specify a file if not help or version
        let i: Vec<String> = vec![String::from("-v")];
        let args = Args::parse(i);
        assert!(args.is_err());

        let i: Vec<String> = vec![String::from("-G")];
        let args = Args::parse(i);
        assert!(args.is_err());

        let i: Vec<String> = vec![String::from("--")];
        let args = Args::parse(i);
        assert!(args.is_err());
    }
}
