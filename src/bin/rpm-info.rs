use clap::Parser;
use rpm_transact::{Result, RpmFile};
use std::path::PathBuf;
use std::process::exit;

#[derive(Debug, Parser)]
#[command(name = "rpm-info")]
struct Args {
    /// Path to a package file
    #[arg(name = "path")]
    path: PathBuf,

    /// Show the changelog as well
    #[arg(long = "changelog", short = 'c')]
    changelog: bool,

    /// Show internal debug information
    #[arg(long = "debug", short = 'd')]
    debug: bool,
}

fn run(args: Args) -> Result<()> {
    let file = RpmFile::open(&args.path)?;
    let pkg = file.to_package();

    if args.debug {
        println!("{:#?}", file.signature);
        println!("{:#?}", file.header);
        return Ok(());
    }

    println!("Name        : {}", pkg.name());
    println!("Epoch       : {}", pkg.epoch());
    println!("Version     : {}", pkg.version());
    println!("Release     : {}", pkg.release());
    println!("Architecture: {}", pkg.arch());
    println!("NEVRA       : {}", pkg.nevra());
    println!(
        "Source RPM  : {}",
        pkg.header.get_str("sourcerpm").unwrap_or_default()
    );
    println!(
        "Summary     : {}",
        pkg.header.get_str("summary").unwrap_or_default()
    );
    println!("Files       :");
    for name in pkg.filenames() {
        println!("  {}", name);
    }
    println!("Provides    :");
    for dep in pkg.provides() {
        println!("  {}", dep);
    }
    println!("Requires    :");
    for dep in pkg.requires() {
        println!("  {}", dep);
    }
    if args.changelog {
        println!("Changelog   :\n{}", pkg.changelog(None, None));
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("{}", err);
        exit(1);
    }
}
