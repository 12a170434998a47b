//! Renders the `meshfrag(1)` manual page from the simulation CLI.
//!
//! The page lands in `target/generated-man` unless `MESHFRAG_MAN_DIR`
//! names another directory.

use std::{env, fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

const MAN_DIR_VAR: &str = "MESHFRAG_MAN_DIR";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed={MAN_DIR_VAR}");

    let man_dir = env::var_os(MAN_DIR_VAR)
        .map_or_else(|| PathBuf::from("target/generated-man"), PathBuf::from);
    fs::create_dir_all(&man_dir)?;

    let version = env::var("CARGO_PKG_VERSION")?;
    let page = Man::new(cli::Cli::command())
        .section("1")
        .source(format!("meshfrag {version}"))
        .manual("Mesh Fragmentation Tools");
    let mut rendered = Vec::new();
    page.render(&mut rendered)?;
    fs::write(man_dir.join("meshfrag.1"), rendered)?;

    Ok(())
}
