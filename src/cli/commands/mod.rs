pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};
use std::path::PathBuf;

pub const ARG_PORT: &str = "port";
pub const ARG_ENV_FILE: &str = "env-file";
pub const ARG_LOG_FILE: &str = "log-file";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("webfinance")
        .about("WebFinance accounts service")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("WEBFINANCE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_ENV_FILE)
                .long("env-file")
                .help("Settings file, read when present")
                .long_help(
                    "Settings file in KEY=VALUE format. When it does not exist, settings are read from Secret Manager if GOOGLE_CLOUD_PROJECT is set.",
                )
                .default_value(".env")
                .env("WEBFINANCE_ENV_FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_LOG_FILE)
                .long("log-file")
                .help("Rotating log file used outside Google Cloud")
                .default_value("webfinance.log")
                .env("WEBFINANCE_LOG_FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        );

    logging::with_args(command)
}
