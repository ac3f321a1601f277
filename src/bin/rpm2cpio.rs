use clap::Parser;
use rpm_transact::{Result, RpmFile};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::exit;

#[derive(Debug, Parser)]
#[command(name = "rpm2cpio")]
struct Args {
    /// Path to a package file
    #[arg(name = "rpm")]
    path: PathBuf,

    /// Path to save the decompressed cpio archive
    #[arg(long = "output")]
    output: PathBuf,
}

fn run(args: Args) -> Result<()> {
    let mut rpm = RpmFile::open(&args.path)?;
    let mut writer = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&args.output)
        .map_err(rpm_transact::Error::Io)?;
    let mut reader = rpm.payload_reader()?;
    io::copy(&mut reader, &mut writer).map_err(rpm_transact::Error::Io)?;
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("{}", err);
        exit(1);
    }
}
