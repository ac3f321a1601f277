use clap::Parser;
use rpm_transact::db::verify_rpmdb;
use rpm_transact::{Resolver, Result};
use std::path::PathBuf;
use std::process::exit;

#[derive(Debug, Parser)]
#[command(name = "rpmdb-verify")]
struct Args {
    /// Database directory
    #[arg(long = "dbpath", default_value = "/var/lib/rpm")]
    dbpath: PathBuf,

    /// Also check for file conflicts between installed packages
    #[arg(long = "fileconflicts")]
    fileconflicts: bool,
}

fn run(args: &Args) -> Result<usize> {
    let (db, report) = verify_rpmdb(&args.dbpath)?;
    for line in &report.diagnostics {
        println!("{}", line);
    }
    let mut problems = report.diagnostics.len();

    let packages = db.records.into_values().map(|r| r.package);
    let resolver = Resolver::new(packages, args.fileconflicts);
    let deps = resolver.check_dependencies(args.fileconflicts);
    for line in deps
        .unresolved
        .iter()
        .chain(&deps.conflicts)
        .chain(&deps.file_conflicts)
    {
        println!("{}", line);
        problems += 1;
    }
    Ok(problems)
}

fn main() {
    let args = Args::parse();
    match run(&args) {
        Ok(0) => {}
        Ok(n) => {
            eprintln!("{} problems found", n);
            exit(1);
        }
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    }
}
