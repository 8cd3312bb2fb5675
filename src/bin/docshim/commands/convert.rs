//! `docshim convert` command

use std::io::{Read, Write};

use anyhow::{Context, Result};

use crate::cli::ConvertArgs;
use docshim::{Config, DocShim, Format, ShimError};

pub fn execute(args: ConvertArgs, config: &Config) -> Result<()> {
    let format = Format::from(args.format.as_str());

    let input = match args.input {
        Some(ref path) => std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let shim = DocShim::new(config);
    let result = shim.convert(&format, &input);
    shim.cleanup();

    let output = match result {
        Ok(output) => output,
        Err(ShimError::SidecarReported { info, content }) if !args.strict => {
            for line in info.lines() {
                tracing::warn!("{}", line);
            }
            content
        }
        Err(e) => return Err(e).with_context(|| format!("failed to convert {}", format)),
    };

    match args.output {
        Some(ref path) => std::fs::write(path, &output)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&output).context("failed to write stdout")?;
            stdout.flush().context("failed to write stdout")?;
        }
    }

    Ok(())
}
