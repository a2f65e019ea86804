use anyhow::Result;
use memsift_core::query;

use crate::args::ShellArgs;
use crate::shell::Shell;

pub fn find_all_threads(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let opts = shell.repr_options(args)?;
    let threads = query::find_all_threads(&shell.env, opts, &shell.query_config());
    for (_, repr) in &threads {
        println!("{}", repr);
    }
    eprintln!("{} thread states found", threads.len());
    Ok(())
}

pub fn find_all_stacks(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let include_runnable = args.flag("include-runnable");
    let opts = shell.repr_options(args)?;

    let report = query::find_all_stacks(
        &shell.env,
        include_runnable,
        opts,
        &shell.query_config(),
    )?;
    eprintln!("{} frames skipped as non-runnable", report.skipped_frames);

    for traceback in &report.tracebacks {
        println!("Traceback (most recent call FIRST):");
        for (_, repr) in &traceback.frames {
            println!("  {}", repr);
        }
        if let Some(missing) = traceback.missing_back {
            println!(
                "  <warning: frame points to f_back=@{} which is missing from the found frame list>",
                missing
            );
        }
    }
    Ok(())
}
