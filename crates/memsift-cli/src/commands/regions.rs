use anyhow::Result;
use memsift_core::format_size;

use crate::args::ShellArgs;
use crate::shell::Shell;

pub fn run(shell: &mut Shell, _args: &ShellArgs) -> Result<()> {
    let mut total = 0u64;
    for (start, size) in shell.env.store().all_regions() {
        println!("{}-{} ({})", start, start.offset_bytes(size as i64), format_size(size));
        total += size;
    }
    println!("All regions: {}", format_size(total));
    Ok(())
}
