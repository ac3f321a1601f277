use clap::Parser;
use rpm_transact::RpmFile;
use std::path::PathBuf;
use std::process::exit;

#[derive(Debug, Parser)]
#[command(name = "rpm-verify")]
struct Args {
    /// Package files to verify
    #[arg(name = "rpms", required = true)]
    paths: Vec<PathBuf>,

    /// Skip the sha1/md5 digest checks
    #[arg(long = "nodigest")]
    nodigest: bool,

    /// Print every diagnostic instead of a summary line
    #[arg(long = "verbose", short = 'v')]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let mut failed = 0;
    for path in &args.paths {
        // a broken package aborts only its own verification
        let diags = RpmFile::open(path).and_then(|mut rpm| rpm.verify(args.nodigest));
        match diags {
            Ok(diags) if diags.is_empty() => {
                if args.verbose {
                    println!("{}: ok", path.display());
                }
            }
            Ok(diags) => {
                failed += 1;
                if args.verbose {
                    for diag in &diags {
                        println!("{}: {}", path.display(), diag);
                    }
                } else {
                    println!("{}: {} problems found", path.display(), diags.len());
                }
            }
            Err(err) => {
                failed += 1;
                eprintln!("{}", err);
            }
        }
    }
    if failed > 0 {
        exit(1);
    }
}
