//! Not-So-Tiny BASIC: a Palo Alto Tiny BASIC descendant
//!
//! Twenty-six 16-bit integer variables named A-Z, up to 26 integer arrays
//! with the same names, and a program store edited by line number. The
//! interpreter core is host-agnostic; see [`host::Host`] for the seam.

mod arena;
mod error;
mod expr;
mod host;
mod interp;
mod scan;
#[cfg(test)]
mod testhost;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::anyhow;
use clap::Parser;

use host::{Host, StdHost};
use interp::Interp;

#[derive(Parser)]
#[command(name = "tbasic", version, about = "A Not-So-Tiny BASIC interpreter")]
struct Args {
    /// BASIC program to load and run; the interpreter exits when it ends
    program: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut host = StdHost::new();
    let lecho = host.enable_raw_mode();
    let mut interp = Interp::new(host, lecho);

    let result = match args.program {
        Some(ref path) => autorun(&mut interp, path),
        None => {
            interp.banner();
            interp.run(false);
            Ok(())
        }
    };

    interp.host_mut().disable_raw_mode();
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn autorun(interp: &mut Interp<StdHost>, path: &Path) -> anyhow::Result<()> {
    let name = path.display().to_string();
    if !interp.host_mut().open_read(&name) {
        return Err(anyhow!("Failed to load {name}"));
    }
    interp.load_program();
    interp.host_mut().close_file();
    interp.run(true);
    Ok(())
}
