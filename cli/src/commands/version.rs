//! `a3s-pack version` command.

use clap::Args;

use super::CliError;

#[derive(Args, Debug)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), CliError> {
    println!("a3s-pack version {}", a3s_pack_core::VERSION);
    Ok(())
}
