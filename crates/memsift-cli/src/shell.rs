//! The interactive analysis shell.

use anyhow::Result;
use memsift_core::{Environment, MappedAddr, QueryConfig, ReprOptions};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tracing::debug;

use crate::args::{parse_hex_u64, ShellArgs};
use crate::commands;

pub struct Shell {
    pub env: Environment,
    pub threads: usize,
    pub should_exit: bool,
}

impl Shell {
    pub fn new(env: Environment, threads: usize) -> Self {
        Self {
            env,
            threads,
            should_exit: false,
        }
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            threads: self.threads,
            progress: true,
        }
    }

    /// Parse an address argument: hex with optional `0x`, optionally
    /// byteswapped, with each leading `*` dereferencing one more level of
    /// pointers before returning.
    pub fn parse_addr(&self, text: &str, bswap: bool) -> Result<MappedAddr> {
        let derefs = text.chars().take_while(|&c| c == '*').count();
        let mut value = parse_hex_u64(&text[derefs..])?;
        if bswap {
            value = value.swap_bytes();
        }
        let mut addr = MappedAddr::new(value);
        for _ in 0..derefs {
            addr = self.env.store().read_addr(addr)?;
        }
        Ok(addr)
    }

    /// Repr formatting options shared by every command that prints
    /// object representations.
    pub fn repr_options(&self, args: &ShellArgs) -> Result<ReprOptions> {
        let defaults = ReprOptions::default();
        Ok(ReprOptions {
            max_recursion_depth: args
                .i64_value("max-recursion-depth", defaults.max_recursion_depth)?,
            max_entries: args.i64_value("max-entries", defaults.max_entries)?,
            max_string_length: args
                .u64_value("max-string-length", defaults.max_string_length as u64)?
                as usize,
            show_all_addresses: args.flag("show-all-addresses"),
            frame_omit_back: args.flag("frame-omit-back"),
            bytes_as_hex: args.flag("bytes-as-hex"),
            is_short: args.flag("short"),
        })
    }

    pub fn run_command(&mut self, line: &str) -> Result<()> {
        commands::dispatch(self, line)
    }

    /// Prompt loop. Ends on `exit` or end-of-input.
    pub fn run(&mut self) -> Result<()> {
        let mut editor: Editor<(), DefaultHistory> = Editor::new()?;
        let prompt = format!("{}> ", self.env.snapshot_path().display());
        while !self.should_exit {
            match editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line);
                    if let Err(e) = self.run_command(line) {
                        eprintln!("Error: {:#}", e);
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    debug!("readline error: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }
}
