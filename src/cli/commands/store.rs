use clap::{Arg, Command};

pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";
pub const ARG_STORE_RETRY_BACKOFF_MS: &str = "store-retry-backoff-ms";
pub const ARG_SWEEP_INTERVAL: &str = "sweep-interval";
pub const ARG_OUTBOX_POLL_INTERVAL: &str = "outbox-poll-interval";
pub const ARG_OUTBOX_BATCH_SIZE: &str = "outbox-batch-size";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long(ARG_STORE_TIMEOUT_MS)
                .help("Timeout applied to every store call, in milliseconds")
                .default_value("2000")
                .env("KEYWARD_STORE_TIMEOUT_MS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_STORE_RETRY_BACKOFF_MS)
                .long(ARG_STORE_RETRY_BACKOFF_MS)
                .help("Back-off before retrying a failed idempotent store call, in milliseconds")
                .default_value("100")
                .env("KEYWARD_STORE_RETRY_BACKOFF_MS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL)
                .long(ARG_SWEEP_INTERVAL)
                .help("Seconds between purges of expired keys")
                .default_value("60")
                .env("KEYWARD_SWEEP_INTERVAL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_POLL_INTERVAL)
                .long(ARG_OUTBOX_POLL_INTERVAL)
                .help("Seconds between activation outbox delivery passes (postgres only)")
                .default_value("2")
                .env("KEYWARD_OUTBOX_POLL_INTERVAL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_OUTBOX_BATCH_SIZE)
                .long(ARG_OUTBOX_BATCH_SIZE)
                .help("Activation links delivered per outbox pass (postgres only)")
                .default_value("10")
                .env("KEYWARD_OUTBOX_BATCH_SIZE")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
