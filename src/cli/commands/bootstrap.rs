use clap::{Arg, Command};

pub const ARG_ACCESS_TOKEN: &str = "bootstrap-admin-access-token";
pub const ARG_REFRESH_TOKEN: &str = "bootstrap-admin-refresh-token";
pub const ARG_EMAIL: &str = "bootstrap-admin-email";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN)
                .long(ARG_ACCESS_TOKEN)
                .help("Access token of an admin pair seeded at startup")
                .env("KEYWARD_BOOTSTRAP_ADMIN_ACCESS_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN)
                .long(ARG_REFRESH_TOKEN)
                .help("Refresh token of the admin pair seeded at startup")
                .env("KEYWARD_BOOTSTRAP_ADMIN_REFRESH_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_EMAIL)
                .long(ARG_EMAIL)
                .help("Email marked admin eligible at startup")
                .env("KEYWARD_BOOTSTRAP_ADMIN_EMAIL"),
        )
}
