use clap::{Arg, Command, value_parser};

pub(super) fn root_cli() -> Command {
    Command::new("procstatus")
        .about("Inspects the processing status of the cluster nodes")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(add_watermark_subcommand())
        .subcommand(add_list_subcommand())
        .subcommand(add_local_subcommand())
}

fn add_watermark_subcommand() -> Command {
    Command::new("watermark")
        .about("Prints the earliest post-indexing timestamp of the active nodes")
        .arg(
            Arg::new("threshold-ms")
                .long("threshold-ms")
                .help("Staleness threshold, overrides PROCESSING_STATUS_UPDATE_THRESHOLD_MS")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("cutoff")
                .long("cutoff")
                .help("Journal write rate cutoff, overrides PROCESSING_STATUS_JOURNAL_WRITE_RATE_THRESHOLD")
                .value_parser(value_parser!(f64)),
        )
}

fn add_list_subcommand() -> Command {
    Command::new("list").about("Prints the records of all nodes as JSON lines")
}

fn add_local_subcommand() -> Command {
    Command::new("local").about("Prints the record of the local node")
}
