// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("instill")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Instill Project")
        .about("Incremental file installation from declarative configuration")
        .subcommand_required(true)
        .subcommand(
            Command::new("install")
                .about("Install the targets declared in a configuration file")
                .arg(Arg::new("config").required(true).help("Configuration file"))
                .arg(
                    Arg::new("root")
                        .short('r')
                        .long("root")
                        .help("Install root for relative target names"),
                )
                .arg(
                    Arg::new("only")
                        .long("only")
                        .action(ArgAction::Append)
                        .help("Install only the named target(s)"),
                )
                .arg(
                    Arg::new("no_overwrite")
                        .long("no-overwrite")
                        .action(ArgAction::SetTrue)
                        .help("Fail if a target file already exists"),
                )
                .arg(
                    Arg::new("checksum_method")
                        .long("checksum-method")
                        .default_value("md5")
                        .help("Checksum algorithm: md5, sha256 or mtime+size"),
                ),
        )
}

fn main() -> std::io::Result<()> {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_else(|_| ".".to_string()));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer: Vec<u8> = Vec::new();
    man.render(&mut buffer)?;
    fs::write(man_dir.join("instill.1"), buffer)?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
