use anyhow::Result;

use crate::args::ShellArgs;
use crate::shell::Shell;

pub fn show(shell: &mut Shell, _args: &ShellArgs) -> Result<()> {
    println!("Base type object at {}", shell.env.base_type());
    // The types map is already name-sorted.
    let mut count = 0usize;
    for (name, addr) in shell.env.types() {
        println!("Type object {} at {}", name, addr);
        count += 1;
    }
    println!("{} non-base type objects overall", count);
    Ok(())
}

pub fn find_base_type(shell: &mut Shell, _args: &ShellArgs) -> Result<()> {
    let addr = shell.env.find_base_type(shell.threads, true)?;
    println!("Base type object found at {}", addr);
    Ok(())
}

pub fn find_all_types(shell: &mut Shell, _args: &ShellArgs) -> Result<()> {
    let count = shell.env.find_all_types(shell.threads, true)?;
    println!("{} type objects recorded", count);
    Ok(())
}
