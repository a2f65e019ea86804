use anyhow::Result;
use memsift_core::query::{self, SIZE_BUCKETS};
use memsift_core::format_size;

use crate::args::ShellArgs;
use crate::shell::Shell;

pub fn run(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let bytes_mode = args.flag("bytes");
    let print_smaller_than = args.u64_value("print-smaller-than", 0)?;
    let print_larger_than = args.u64_value("print-larger-than", 0)?;
    let opts = shell.repr_options(args)?;

    let stats = query::aggregate_strings(
        &shell.env,
        bytes_mode,
        print_smaller_than,
        print_larger_than,
        opts,
        &shell.query_config(),
    )?;

    for (_, repr) in &stats.printed {
        println!("{}", repr);
    }
    println!(
        "Found {} objects with {} data bytes overall ({})",
        stats.total_objects,
        stats.total_bytes,
        format_size(stats.total_bytes)
    );
    let last_used = stats
        .histogram
        .iter()
        .rposition(|&count| count != 0)
        .unwrap_or(0);
    for (index, &count) in stats.histogram.iter().enumerate().take(last_used + 1) {
        let bound = match SIZE_BUCKETS.get(index) {
            Some(bound) => bound.to_string(),
            None => format!(">{}", SIZE_BUCKETS[SIZE_BUCKETS.len() - 1]),
        };
        println!("Length <= {}: {} objects", bound, count);
    }
    Ok(())
}
