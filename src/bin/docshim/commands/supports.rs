//! `docshim supports` command

use anyhow::Result;

use crate::cli::SupportsArgs;
use docshim::{Config, DocShim, Format};

pub fn execute(args: SupportsArgs, config: &Config) -> Result<()> {
    let formats: Vec<Format> = if args.formats.is_empty() {
        Format::builtin().to_vec()
    } else {
        args.formats.iter().map(|f| Format::from(f.as_str())).collect()
    };

    let shim = DocShim::new(config);
    for format in &formats {
        let answer = if shim.supports(format) { "yes" } else { "no" };
        println!("{:<12} {}", format, answer);
    }
    shim.cleanup();

    Ok(())
}
