use anyhow::Result;
use memsift_core::query;

use crate::args::ShellArgs;
use crate::shell::Shell;

pub fn run(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let env = &shell.env;
    eprintln!(
        "Looking for objects of types {} (Task), {} (Future), and {} (GatheringFuture)",
        env.get_type("_asyncio.Task")?,
        env.get_type("_asyncio.Future")?,
        env.get_type("_GatheringFuture")?
    );

    let opts = shell.repr_options(args)?;
    let graph = query::async_task_graph(env, opts, &shell.query_config())?;
    eprintln!(
        "{} nodes in awaiter graph, {} roots",
        graph.edges.len(),
        graph.roots.len()
    );
    print!("{}", graph.render());
    Ok(())
}
