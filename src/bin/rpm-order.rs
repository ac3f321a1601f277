use clap::Parser;
use rpm_transact::{Orderer, Resolver, Result, RpmFile};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::exit;

#[derive(Debug, Parser)]
#[command(name = "rpm-order")]
struct Args {
    /// Package files to plan an installation order for
    #[arg(name = "rpms", required = true)]
    paths: Vec<PathBuf>,

    /// Also report file conflicts between the packages
    #[arg(long = "fileconflicts")]
    fileconflicts: bool,

    /// Report problems but do not fail on unresolved dependencies
    #[arg(long = "ignore-missing")]
    ignore_missing: bool,
}

fn run(args: &Args) -> Result<()> {
    let mut packages = Vec::new();
    for path in &args.paths {
        match RpmFile::open(path) {
            Ok(rpm) => {
                let mut pkg = rpm.to_package();
                let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                pkg.attach_source(path.clone(), size, String::new());
                packages.push(pkg);
            }
            // structural damage skips the package, the batch continues
            Err(err) => eprintln!("{}", err),
        }
    }

    let mut resolver = Resolver::new(packages, args.fileconflicts);
    for line in resolver.process_obsoletes() {
        eprintln!("Warning: {}", line);
    }
    let report = resolver.check_dependencies(args.fileconflicts);
    for line in report
        .conflicts
        .iter()
        .chain(&report.file_conflicts)
        .chain(&report.unresolved)
    {
        eprintln!("Warning: {}", line);
    }
    if !report.unresolved.is_empty() && !args.ignore_missing {
        return Err(rpm_transact::Error::Resolution(report.unresolved));
    }

    let installs: Vec<usize> = resolver.ids().collect();
    let orderer = Orderer::new(&resolver, installs, HashMap::new(), HashMap::new(), Vec::new());
    for (op, id) in orderer.order()? {
        println!("{} {}", op, resolver.package(id).nevra());
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("{}", err);
        exit(1);
    }
}
