//! An interactive survey program that can be automated with the library.
//!
//! Attach a console's tty as this process's stdin/stdout and drive it
//! with `expect_string`/`send_line`. Illustrative only; the library never
//! spawns processes itself.

use anyhow::{bail, Result};
use std::io::{self, BufRead, Write};

fn main() -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();

    for (prompt, answer) in [
        ("What is 1+1?", "2"),
        ("What is Netflix backwards?", "xilfteN"),
    ] {
        write!(out, "{prompt}: ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("unexpected end of input");
        }
        write!(out, "{line}")?;
        out.flush()?;

        if line.trim() != answer {
            bail!("wrong answer");
        }
    }

    Ok(())
}
