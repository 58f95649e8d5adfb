use crate::args::CommonArgs;
use clap::Args;
use domain::roster::RosterRepository;
use infrastructure::roster::CsvRosterRepository;
use tracing::{debug, info, instrument};

#[derive(Args, Debug)]
pub struct CheckRosterArgs {}

#[instrument(level = "info", skip(common_args, args))]
pub fn run(common_args: CommonArgs, args: CheckRosterArgs) -> anyhow::Result<()> {
    let CommonArgs { roster_path, .. } = common_args;
    let CheckRosterArgs {} = args;

    let repository = CsvRosterRepository::new(roster_path.clone());

    let mut count = 0;
    for entry in repository.open()? {
        let entry = entry?;
        debug!(line = entry.line, "{} -> {}", entry.handle, entry.role_name);
        count += 1;
    }

    info!(
        path = %roster_path.display(),
        "Roster is well-formed with {} entries",
        count,
    );

    Ok(())
}
