#[cfg(unix)]
mod unix {
    use clap::Parser;
    use rpm_transact::payload::extract::ExtractOptions;
    use rpm_transact::{Result, RpmFile};
    use std::path::PathBuf;

    #[derive(Debug, Parser)]
    #[command(name = "rpm-extract")]
    pub struct Args {
        /// Path to a package file
        #[arg(name = "rpm")]
        path: PathBuf,

        /// Directory to extract into
        #[arg(long = "dest", default_value = ".")]
        dest: PathBuf,

        /// Apply file owners and groups (needs privileges)
        #[arg(long = "owner")]
        owner: bool,

        /// Relocate a path prefix, as OLD=NEW
        #[arg(long = "relocate")]
        relocate: Vec<String>,
    }

    pub fn run(args: Args) -> Result<()> {
        let mut relocations = Vec::new();
        for arg in &args.relocate {
            match arg.split_once('=') {
                Some((old, new)) => relocations.push((old.to_string(), new.to_string())),
                None => {
                    return Err(rpm_transact::Error::Compat(format!(
                        "bad relocation \"{}\", expected OLD=NEW",
                        arg
                    )));
                }
            }
        }
        let mut rpm = RpmFile::open(&args.path)?;
        let options = ExtractOptions {
            dest: args.dest.clone(),
            change_owner: args.owner,
            relocations,
        };
        for diag in rpm.extract(&options)? {
            eprintln!("{}", diag);
        }
        Ok(())
    }
}

#[cfg(unix)]
fn main() {
    use clap::Parser;
    let args = unix::Args::parse();
    if let Err(err) = unix::run(args) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("rpm-extract only works on unix");
    std::process::exit(1);
}
