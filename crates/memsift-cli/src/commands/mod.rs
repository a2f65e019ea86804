//! Shell command registry and dispatch.

pub mod analysis;
pub mod context;
pub mod find;
pub mod objects;
pub mod regions;
pub mod stacks;
pub mod strings;
pub mod tasks;

use anyhow::{bail, Result};

use crate::args::ShellArgs;
use crate::shell::Shell;

pub struct CommandDef {
    pub name: &'static str,
    pub help: &'static str,
    pub run: fn(&mut Shell, &ShellArgs) -> Result<()>,
}

pub static COMMANDS: &[CommandDef] = &[
    CommandDef {
        name: "help",
        help: "  help\n    You're reading it now.\n",
        run: |_, _| {
            println!("Commands:");
            for def in COMMANDS {
                print!("{}", def.help);
            }
            Ok(())
        },
    },
    CommandDef {
        name: "exit",
        help: "  exit\n    Ends this session.\n",
        run: |shell, _| {
            shell.should_exit = true;
            Ok(())
        },
    },
    CommandDef {
        name: "regions",
        help: "  regions\n    Lists all memory regions in the current snapshot.\n",
        run: regions::run,
    },
    CommandDef {
        name: "show-analysis-data",
        help: "  show-analysis-data\n    Shows the saved analysis data for this snapshot.\n",
        run: analysis::show,
    },
    CommandDef {
        name: "find-base-type",
        help: "  find-base-type\n    Sweeps memory for the base meta-type (the type object that is its\n    own type) and saves it in the analysis data.\n",
        run: analysis::find_base_type,
    },
    CommandDef {
        name: "find-all-types",
        help: "  find-all-types\n    Sweeps memory for all type objects and saves them in the analysis\n    data. Requires the base type (see find-base-type).\n",
        run: analysis::find_all_types,
    },
    CommandDef {
        name: "find",
        help: "  find DATA [OPTIONS]\n    Searches for DATA in all readable memory. DATA is hex byte pairs, or\n    a double-quoted string. Options:\n      --ptr: Parse DATA as a 64-bit hexadecimal integer.\n      --bswap: Byteswap DATA before searching (only with --ptr).\n      --align=ALIGN: Only find DATA at ALIGN-aligned addresses\n          (default 8 with --ptr, 1 otherwise).\n      --count: Don't print each occurrence, just count them.\n",
        run: find::run,
    },
    CommandDef {
        name: "count-by-type",
        help: "  count-by-type\n    Counts the number of existing objects for each known type.\n",
        run: objects::count_by_type,
    },
    CommandDef {
        name: "find-all-objects",
        help: "  find-all-objects [OPTIONS]\n    Finds all objects of a given type. Options:\n      --type-addr=ADDRESS: Find objects whose type object is at this address.\n      --type-name=NAME: Find objects whose type has this name.\n      --count: Only count the objects; don't print them.\n    The formatting options to the repr command are also valid here.\n",
        run: objects::find_all_objects,
    },
    CommandDef {
        name: "find-references",
        help: "  find-references ADDRESS [OPTIONS]\n    Finds all decodable objects whose direct referents include ADDRESS.\n    The formatting options to the repr command are also valid here.\n",
        run: objects::find_references,
    },
    CommandDef {
        name: "find-module",
        help: "  find-module NAME\n    Finds all modules with the given name (as in the __name__ attribute).\n    The sys module typically contains a dict of all other modules; to\n    find it, use `find-module sys`.\n",
        run: objects::find_module,
    },
    CommandDef {
        name: "find-all-threads",
        help: "  find-all-threads\n    Finds all active thread states.\n",
        run: stacks::find_all_threads,
    },
    CommandDef {
        name: "find-all-stacks",
        help: "  find-all-stacks [OPTIONS]\n    Collects all running frames and organizes them into stacks, showing\n    what each thread was doing at snapshot time. Options:\n      --include-runnable: Include frames that were paused but runnable.\n    The formatting options to the repr command are also valid here.\n",
        run: stacks::find_all_stacks,
    },
    CommandDef {
        name: "aggregate-strings",
        help: "  aggregate-strings [OPTIONS]\n    Finds all strings and prints a log-scaled histogram of their lengths.\n    Options:\n      --bytes: Aggregate over bytes objects instead of strings.\n      --print-smaller-than=N: Print all strings of fewer than N chars.\n      --print-larger-than=N: Print all strings of N chars or more.\n    The formatting options to the repr command are also valid here.\n",
        run: strings::run,
    },
    CommandDef {
        name: "async-task-graph",
        help: "  async-task-graph\n    Finds all async tasks and futures and shows the graph of awaiters.\n    The formatting options to the repr command are also valid here.\n",
        run: tasks::run,
    },
    CommandDef {
        name: "context",
        help: "  context ADDRESS [OPTIONS]\n    Shows the contents of memory near ADDRESS. Options:\n      --bswap: Byteswap ADDRESS before reading data.\n      --size=N: Show N bytes before and after ADDRESS (default 0x100).\n",
        run: context::run,
    },
    CommandDef {
        name: "repr",
        help: "  repr ADDRESS [OPTIONS]\n    Prints the object at ADDRESS. Each leading asterisk on ADDRESS\n    dereferences one more level of pointers first. Options:\n      --max-recursion-depth=N: Limit how deeply to print found objects.\n      --max-entries=N: Limit how many items to print per container.\n      --max-string-length=N: Limit how much data to print per string\n          (default 1024).\n      --show-all-addresses: Show addresses for all objects, even ints/strs.\n      --frame-omit-back: Don't recur into f_back for frame objects.\n      --bytes-as-hex: Always format bytes objects as hex.\n      --short: Omit less-frequently-relevant fields on some objects.\n    All of these options are also valid for other commands that print\n    object representations.\n",
        run: context::repr,
    },
];

pub fn dispatch(shell: &mut Shell, line: &str) -> Result<()> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("");
    if name.is_empty() {
        return Ok(());
    }
    let Some(def) = COMMANDS.iter().find(|def| def.name == name) else {
        bail!("invalid command: {}", name);
    };
    let args = ShellArgs::parse(rest)?;
    (def.run)(shell, &args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_are_unique() {
        let mut names: Vec<&str> = COMMANDS.iter().map(|def| def.name).collect();
        names.sort_unstable();
        let len = names.len();
        names.dedup();
        assert_eq!(len, names.len());
    }

    #[test]
    fn test_every_command_has_help() {
        for def in COMMANDS {
            assert!(def.help.contains(def.name), "help for {} is unlabeled", def.name);
        }
    }
}
