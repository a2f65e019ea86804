use anyhow::Result;
use memsift_core::query;

use crate::args::{parse_data_string, parse_hex_u64, ShellArgs};
use crate::shell::Shell;

pub fn run(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let (needle, alignment) = if args.flag("ptr") {
        let mut value = parse_hex_u64(args.require_positional(0, "DATA")?)?;
        if args.flag("bswap") {
            value = value.swap_bytes();
        }
        (value.to_le_bytes().to_vec(), args.u64_value("align", 8)?)
    } else {
        let needle = parse_data_string(args.require_positional(0, "DATA")?)?;
        (needle, args.u64_value("align", 1)?)
    };
    anyhow::ensure!(!needle.is_empty(), "search data is empty");
    anyhow::ensure!(
        alignment.is_power_of_two() && alignment <= 0x1000,
        "--align must be a power of two no greater than 4096"
    );
    let count_only = args.flag("count");

    let hits = query::find_data(&shell.env, &needle, alignment, &shell.query_config());
    if !count_only {
        for addr in &hits {
            println!("Data found at {}", addr);
        }
    }
    eprintln!("{} results found", hits.len());
    Ok(())
}
