pub mod limits;
pub mod logging;
pub mod tokens;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";
pub const ARG_REDIRECT_HOSTS: &str = "redirect-hosts";

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

    let command = Command::new("custode")
        .about(env!("CARGO_PKG_DESCRIPTION"))
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
                .env("CUSTODE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("Seconds between purges of expired entries")
                .env("CUSTODE_SWEEP_INTERVAL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REDIRECT_HOSTS)
                .long(ARG_REDIRECT_HOSTS)
                .help("Hosts allowed as post-login redirect targets, host or host:port")
                .env("CUSTODE_REDIRECT_HOSTS")
                .value_delimiter(',')
                .default_value("localhost:3000"),
        );

    let command = limits::with_args(command);
    let command = tokens::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "custode");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_hosts() {
        temp_env::with_vars_unset(["CUSTODE_LOG_LEVEL"], || {
            let matches = new().get_matches_from(vec![
                "custode",
                "--port",
                "9090",
                "--redirect-hosts",
                "app.example.com,localhost:3000",
            ]);

            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9090));
            let hosts: Vec<&String> = matches
                .get_many::<String>(ARG_REDIRECT_HOSTS)
                .map(Iterator::collect)
                .unwrap_or_default();
            assert_eq!(hosts, ["app.example.com", "localhost:3000"]);
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("CUSTODE_PORT", Some("443")),
                ("CUSTODE_SWEEP_INTERVAL_SECONDS", Some("5")),
                ("CUSTODE_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["custode"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<u64>(ARG_SWEEP_INTERVAL_SECONDS).copied(),
                    Some(5)
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let result =
            new().try_get_matches_from(vec!["custode", "--sweep-interval-seconds", "0"]);
        assert!(result.is_err());
    }
}
