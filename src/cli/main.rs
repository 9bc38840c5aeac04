//-
// Copyright (c) 2024, Tooltracker contributors
//
// This file is part of Tooltracker.
//
// Tooltracker is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Tooltracker is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Tooltracker. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/tooltracker/tooltracker.toml",
    "/usr/local/etc/tooltracker/tooltracker.toml",
];

/// Track who last borrowed each tool, by e-mail.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// The configuration file
    /// [default: /etc/tooltracker/tooltracker.toml or
    /// /usr/local/etc/tooltracker/tooltracker.toml]
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    Deliver(DeliverSubcommand),
    List(ListSubcommand),
    Tool(ToolSubcommand),
}

/// Process command e-mails.
///
/// This is meant to be run as an MDA, e.g. from a Postfix `pipe` transport
/// or a `.forward` file. By default, it reads a single message from standard
/// input.
///
/// Each message is checked and, if acceptable, applied to the tracker.
/// Messages which can never be accepted (bad signatures, unknown commands,
/// etc.) are consumed silently so that nobody gets bounces; the reason is
/// logged. If a message could be accepted later (e.g. DNS is temporarily
/// broken or the database is locked), the command exits with EX_TEMPFAIL so
/// the MTA retries.
///
/// If the first line of an input ends with a UNIX line ending, all line feeds
/// in that input are treated as DOS line endings.
#[derive(StructOpt)]
pub(super) struct DeliverSubcommand {
    /// The envelope sender of the message(s). If not given, the single
    /// address in each message's From header is used.
    #[structopt(short, long)]
    pub(super) from: Option<String>,

    /// The messages to process. "-" will read from stdin.
    #[structopt(parse(from_os_str), default_value = "-")]
    pub(super) inputs: Vec<PathBuf>,
}

/// Show who last had each tool.
///
/// Without any tags, tools tagged "hidden" are left out.
#[derive(StructOpt)]
pub(super) struct ListSubcommand {
    /// Show all tools, including hidden ones.
    #[structopt(short, long)]
    pub(super) all: bool,

    /// Filter by tags: "tag" includes tools with that tag, "+tag" requires
    /// it, "-tag" excludes tools with it. Put "--" before the first tag if
    /// it starts with "-".
    #[structopt(allow_hyphen_values(true))]
    pub(super) tags: Vec<String>,
}

/// Create, replace, or show the description of a tool.
#[derive(StructOpt)]
pub(super) struct ToolSubcommand {
    /// Show the current description instead of changing it.
    #[structopt(long, conflicts_with_all(&["description", "image", "tag"]))]
    pub(super) show: bool,

    /// A description of the tool.
    #[structopt(short, long)]
    pub(super) description: Option<String>,

    /// A picture of the tool.
    #[structopt(short, long, parse(from_os_str))]
    pub(super) image: Option<PathBuf>,

    /// Tag the tool. Can be passed multiple times. Replaces all existing
    /// tags.
    #[structopt(short, long, number_of_values(1))]
    pub(super) tag: Vec<String>,

    /// The name of the tool, as used in "Borrowed" e-mails.
    pub(super) name: String,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options = Options::from_clap(&match Options::clap().get_matches_safe()
    {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        },
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        },
    });

    let config_path = options.config.unwrap_or_else(|| {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .unwrap_or_else(|| {
                die!(
                    EX_CONFIG,
                    "Neither {} exists;\n\
                     use --config=/path/to/tooltracker.toml if your\n\
                     installation is elsewhere.",
                    DEFAULT_CONFIG_PATHS.join(" nor "),
                )
            })
    });
    let config = load_config(&config_path);

    init_log(&config_path);

    match options.command {
        Command::Deliver(cmd) => super::deliver::deliver(config, cmd),
        Command::List(cmd) => super::list::list(config, cmd),
        Command::Tool(cmd) => super::tool::tool(config, cmd),
    }
}

fn load_config(path: &Path) -> SystemConfig {
    let mut config_toml = Vec::new();
    if let Err(e) =
        fs::File::open(path).and_then(|mut f| f.read_to_end(&mut config_toml))
    {
        die!(EX_CONFIG, "Error reading '{}': {}", path.display(), e);
    }

    match toml::from_slice(&config_toml) {
        Ok(config) => config,
        Err(e) => {
            die!(EX_CONFIG, "Error in config file at '{}': {}", path.display(), e)
        },
    }
}

fn init_log(config_path: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        init_simple_log();
        return;
    }

    // Right now we have this awkward situation where you can use log4rs *or*
    // syslog, because log4rs-syslog hasn't been updated in quite a while.
    //
    // When running as an MDA, stderr may end up in a bounce message, so
    // failure to set up logging is not worth failing delivery over.
    let log_config_file = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::config::Deserializers::new(),
        ) {
            eprintln!(
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e,
            );
        }
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };

        match syslog::unix(formatter) {
            Ok(logger) => {
                if log::set_boxed_logger(Box::new(syslog::BasicLogger::new(
                    logger,
                )))
                .is_ok()
                {
                    log::set_max_level(log::LevelFilter::Info);
                }
            },
            Err(e) => eprintln!("Failed to connect to syslog: {}", e),
        }
    }
}

fn init_simple_log() {
    use log4rs::append::console::{ConsoleAppender, Target};
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} [{l}][{t}] {m}{n}",
        )))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(
            Root::builder()
                .appender("stderr")
                .build(log::LevelFilter::Info),
        );

    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("Failed to initialise logging: {}", e);
            }
        },
        Err(e) => eprintln!("Failed to initialise logging: {}", e),
    }
}
