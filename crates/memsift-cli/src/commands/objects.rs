use anyhow::{bail, Result};
use memsift_core::{query, MappedAddr};

use crate::args::ShellArgs;
use crate::shell::Shell;

pub fn count_by_type(shell: &mut Shell, _args: &ShellArgs) -> Result<()> {
    let rows = query::count_by_type(&shell.env, &shell.query_config())?;
    for row in &rows {
        println!("({} objects) {} @ {}", row.count, row.name, row.type_addr);
    }
    eprintln!("Found {} types with instances", rows.len());
    Ok(())
}

pub fn find_all_objects(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let type_addr = match args.hex_value("type-addr")? {
        Some(addr) => MappedAddr::new(addr),
        None => match args.value("type-name") {
            Some(name) => shell.env.get_type(name)?,
            None => bail!("one of --type-addr or --type-name is required"),
        },
    };
    let opts = shell.repr_options(args)?;
    let count_only = args.flag("count");

    let found = query::find_all_objects(
        &shell.env,
        type_addr,
        opts,
        count_only,
        &shell.query_config(),
    );
    for (_, repr) in &found.items {
        println!("{}", repr);
    }
    eprintln!("{} objects found", found.count);
    Ok(())
}

pub fn find_references(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let target = shell.parse_addr(args.require_positional(0, "ADDRESS")?, args.flag("bswap"))?;
    let opts = shell.repr_options(args)?;

    let hits = query::find_references(&shell.env, target, opts, &shell.query_config());
    for (addr, repr) in &hits {
        println!("{}: {}", addr, repr);
    }
    eprintln!("{} objects found", hits.len());
    Ok(())
}

pub fn find_module(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let name = args.require_positional(0, "NAME")?;
    let opts = shell.repr_options(args)?;

    let hits = query::find_module(&shell.env, name, opts, &shell.query_config())?;
    for (_, repr) in &hits {
        println!("{}", repr);
    }
    eprintln!("{} modules found", hits.len());
    Ok(())
}
